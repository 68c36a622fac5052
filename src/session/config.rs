use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::transport::SessionSetup;

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSessionConfig {
    /// Microphone capture rate (16kHz)
    pub input_sample_rate: u32,

    /// Rate the agent's audio is decoded at (24kHz)
    pub output_sample_rate: u32,

    /// Number of audio channels (1 = mono)
    pub channels: u16,

    /// Samples per capture block, fixed for the session lifetime
    pub block_size: usize,

    /// Remote agent parameters
    pub agent: AgentConfig,
}

impl Default for LiveSessionConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            block_size: 4096,
            agent: AgentConfig::default(),
        }
    }
}

impl LiveSessionConfig {
    /// Setup announced to the agent when `session_id` opens
    pub fn setup(&self, session_id: &str) -> SessionSetup {
        SessionSetup {
            session_id: session_id.to_string(),
            model: self.agent.model.clone(),
            voice: self.agent.voice.clone(),
            system_instruction: self.agent.system_instruction.clone(),
            response_modalities: vec!["AUDIO".to_string()],
            input_audio_transcription: true,
            output_audio_transcription: true,
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
        }
    }
}
