use thiserror::Error;

use crate::session::{PhaseEvent, SessionPhase};

/// Malformed inbound audio
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("audio chunk is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("audio chunk length {len} is not a multiple of the {frame_size}-byte sample frame")]
    MisalignedLength { len: usize, frame_size: usize },

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),
}

/// Errors surfaced by the live session library
#[derive(Error, Debug)]
pub enum LiveError {
    /// Microphone/output permission or hardware failure
    #[error("Audio device unavailable: {0}")]
    DeviceAcquisition(String),

    /// Connection drop or protocol fault
    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Transition {event:?} not permitted from {from:?}")]
    InvalidTransition { from: SessionPhase, event: PhaseEvent },

    #[error("Playback source {0} is not active")]
    SourceNotActive(u64),

    #[error("No output sink acquired")]
    NoOutputSink,
}

pub type LiveResult<T> = std::result::Result<T, LiveError>;
