pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioFrame, CapturePipeline, ClockOutput, ManualOutput, PlaybackBuffer, PlaybackScheduler,
    ScriptedInput, SourceId, WavFileInput,
};
pub use config::Config;
pub use error::{DecodeError, LiveError, LiveResult};
pub use http::{create_router, AppState};
pub use session::{
    LiveAgentHandle, LiveSession, LiveSessionConfig, SessionPhase, SessionSnapshot, SessionStats,
};
pub use transcript::{Speaker, TranscriptAssembler, TranscriptEntry};
pub use transport::{InboundMessage, MemoryTransport, NatsTransport, Transport, TransportEvent};
