//! Duplex transport to the conversational agent.
//!
//! `Transport::open` delivers `onopen`/`onmessage`/`onerror`/`onclose` as
//! `TransportEvent`s on a channel owned by the session that opened it.

pub mod memory;
pub mod messages;
pub mod nats;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LiveResult;
use crate::transcript::Speaker;

pub use memory::{MemoryTransport, MemoryTransportControl};
pub use messages::{MediaBlob, RealtimeInputMessage, ServerMessage, SessionSetup};
pub use nats::NatsTransport;

/// Callback bundle surfaced as events
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(InboundMessage),
    Error(String),
    Close(Option<String>),
}

/// Sender half handed to a transport when a session opens
///
/// Sends after the session has gone away are discarded.
#[derive(Debug, Clone)]
pub struct TransportCallbacks {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportCallbacks {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn on_open(&self) {
        let _ = self.tx.send(TransportEvent::Open);
    }

    pub fn on_message(&self, message: InboundMessage) {
        let _ = self.tx.send(TransportEvent::Message(message));
    }

    pub fn on_error(&self, reason: impl Into<String>) {
        let _ = self.tx.send(TransportEvent::Error(reason.into()));
    }

    pub fn on_close(&self, reason: Option<String>) {
        let _ = self.tx.send(TransportEvent::Close(reason));
    }

    /// Whether the owning session is still listening
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Incremental transcription text for one speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionDelta {
    pub speaker: Speaker,
    pub text: String,
}

/// One message from the agent, reduced to what the session acts on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub transcription: Option<TranscriptionDelta>,
    pub turn_complete: bool,
    pub interrupted: bool,
    /// Base64 PCM16LE at the session's output rate
    pub audio_chunk: Option<String>,
}

/// An open duplex connection
pub trait SessionHandle: Send {
    /// Queue one media blob; never waits for delivery
    fn send(&self, blob: MediaBlob);

    /// Close the connection; further sends are dropped
    fn close(&mut self);
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session; events for it arrive through `callbacks`
    async fn open(
        &self,
        setup: &SessionSetup,
        callbacks: TransportCallbacks,
    ) -> LiveResult<Box<dyn SessionHandle>>;

    /// Transport name for logging
    fn name(&self) -> &str;
}
