use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::session::LiveSessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone capture rate
    pub input_sample_rate: u32,
    /// Rate the agent's audio is decoded at
    pub output_sample_rate: u32,
    pub channels: u16,
    /// Samples per capture callback
    pub block_size: usize,
    /// WAV file used as the microphone by the binary
    pub input_wav: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            channels: 1,
            block_size: 4096,
            input_wav: None,
        }
    }
}

/// Remote agent parameters, announced to the relay on session setup
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub nats_url: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            model: "native-audio-dialog".to_string(),
            voice: "Zephyr".to_string(),
            system_instruction: String::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Per-session settings derived from the audio and agent sections
    pub fn session_config(&self) -> LiveSessionConfig {
        LiveSessionConfig {
            input_sample_rate: self.audio.input_sample_rate,
            output_sample_rate: self.audio.output_sample_rate,
            channels: self.audio.channels,
            block_size: self.audio.block_size,
            agent: self.agent.clone(),
        }
    }
}
