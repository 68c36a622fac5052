use loqa_live::transport::messages::{RealtimeInputMessage, ServerMessage};
use loqa_live::transport::{MediaBlob, TranscriptionDelta};
use loqa_live::{InboundMessage, LiveSessionConfig, Speaker};

#[test]
fn test_realtime_input_serialization() {
    let msg = RealtimeInputMessage::from(MediaBlob {
        data: "AAAA".to_string(),
        mime_type: "audio/pcm;rate=16000".to_string(),
    });

    let json = serde_json::to_string(&msg).unwrap();
    assert_eq!(
        json,
        r#"{"realtimeInput":{"media":{"data":"AAAA","mimeType":"audio/pcm;rate=16000"}}}"#
    );
}

#[test]
fn test_output_transcription_message() {
    let json = r#"{"serverContent": {"outputTranscription": {"text": "Hi there"}}}"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    assert_eq!(
        msg.transcription,
        Some(TranscriptionDelta {
            speaker: Speaker::Agent,
            text: "Hi there".to_string()
        })
    );
    assert!(!msg.turn_complete);
    assert!(!msg.interrupted);
    assert_eq!(msg.audio_chunk, None);
}

#[test]
fn test_input_transcription_message() {
    let json = r#"{"serverContent": {"inputTranscription": {"text": "Hel"}}}"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    assert_eq!(msg.transcription.unwrap().speaker, Speaker::User);
}

#[test]
fn test_agent_transcription_wins_when_both_present() {
    let json = r#"{
        "serverContent": {
            "inputTranscription": {"text": "user words"},
            "outputTranscription": {"text": "agent words"}
        }
    }"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    let delta = msg.transcription.unwrap();
    assert_eq!(delta.speaker, Speaker::Agent);
    assert_eq!(delta.text, "agent words");
}

#[test]
fn test_audio_turn_message() {
    let json = r#"{
        "serverContent": {
            "modelTurn": {"parts": [{"inlineData": {"data": "AAAAAA==", "mimeType": "audio/pcm;rate=24000"}}]},
            "turnComplete": true
        }
    }"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    assert_eq!(msg.audio_chunk.as_deref(), Some("AAAAAA=="));
    assert!(msg.turn_complete);
}

#[test]
fn test_inline_data_without_mime_type() {
    let json = r#"{"serverContent": {"modelTurn": {"parts": [{"inlineData": {"data": "AAAA"}}]}}}"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    assert_eq!(msg.audio_chunk.as_deref(), Some("AAAA"));
}

#[test]
fn test_interrupted_message() {
    let json = r#"{"serverContent": {"interrupted": true}}"#;

    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(json).unwrap().into();
    assert!(msg.interrupted);
    assert_eq!(msg.transcription, None);
}

#[test]
fn test_message_without_server_content() {
    let msg: InboundMessage = serde_json::from_str::<ServerMessage>(r#"{"setupComplete": {}}"#)
        .unwrap()
        .into();
    assert_eq!(msg, InboundMessage::default());
}

#[test]
fn test_session_setup_serialization() {
    let setup = LiveSessionConfig::default().setup("session-1");
    let json = serde_json::to_value(&setup).unwrap();

    assert_eq!(json["sessionId"], "session-1");
    assert_eq!(json["responseModalities"][0], "AUDIO");
    assert_eq!(json["inputAudioTranscription"], true);
    assert_eq!(json["outputSampleRate"], 24000);
    // Empty instruction is omitted
    assert!(json.get("systemInstruction").is_none());
}
