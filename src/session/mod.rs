//! Live session management
//!
//! This module provides the `LiveSession` coordinator that owns:
//! - The session state machine
//! - Microphone capture and frame encoding
//! - Gapless playback of agent audio
//! - Transcript assembly
//! - Transport lifecycle and teardown

mod config;
mod handle;
mod manager;
mod state;
mod stats;

pub use config::LiveSessionConfig;
pub use handle::{Command, LiveAgentHandle};
pub use manager::LiveSession;
pub use state::{PhaseEvent, SessionPhase, SessionState};
pub use stats::{SessionSnapshot, SessionStats};
