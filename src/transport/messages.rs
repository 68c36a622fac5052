use serde::{Deserialize, Serialize};

use super::{InboundMessage, TranscriptionDelta};
use crate::transcript::Speaker;

/// Base64 media payload with its MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    pub data: String,
    #[serde(default)]
    pub mime_type: String,
}

/// Outbound microphone audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeInput {
    pub media: MediaBlob,
}

impl From<MediaBlob> for RealtimeInputMessage {
    fn from(media: MediaBlob) -> Self {
        Self {
            realtime_input: RealtimeInput { media },
        }
    }
}

/// Session parameters announced when a connection opens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub session_id: String,
    pub model: String,
    pub voice: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_instruction: String,
    pub response_modalities: Vec<String>,
    pub input_audio_transcription: bool,
    pub output_audio_transcription: bool,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

/// Inbound agent message as it appears on the wire
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
}

impl From<ServerMessage> for InboundMessage {
    fn from(message: ServerMessage) -> Self {
        let Some(content) = message.server_content else {
            return InboundMessage::default();
        };

        // Agent transcription takes precedence when both are present
        let transcription = match (content.output_transcription, content.input_transcription) {
            (Some(t), _) => Some(TranscriptionDelta {
                speaker: Speaker::Agent,
                text: t.text,
            }),
            (None, Some(t)) => Some(TranscriptionDelta {
                speaker: Speaker::User,
                text: t.text,
            }),
            (None, None) => None,
        };

        let audio_chunk = content
            .model_turn
            .and_then(|turn| turn.parts.into_iter().next())
            .and_then(|part| part.inline_data)
            .map(|blob| blob.data)
            .filter(|data| !data.is_empty());

        InboundMessage {
            transcription,
            turn_complete: content.turn_complete,
            interrupted: content.interrupted,
            audio_chunk,
        }
    }
}
