use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use async_nats::{Client, ConnectOptions, Event};
use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::messages::{MediaBlob, RealtimeInputMessage, ServerMessage, SessionSetup};
use super::{InboundMessage, SessionHandle, Transport, TransportCallbacks};
use crate::error::{LiveError, LiveResult};

/// Subjects used for one live session on the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSubjects {
    pub setup: String,
    pub input: String,
    pub server: String,
    pub close: String,
}

impl SessionSubjects {
    pub fn new(session_id: &str) -> Self {
        Self {
            setup: format!("live.{}.setup", session_id),
            input: format!("live.{}.input", session_id),
            server: format!("live.{}.server", session_id),
            close: format!("live.{}.close", session_id),
        }
    }
}

/// Frames queued for the relay before new ones are dropped
const OUTBOUND_FRAMES: usize = 16;

/// Connection state shared by the client callback, the reader task and
/// the session handle
#[derive(Debug)]
struct LinkState {
    connected: AtomicBool,
    closing: AtomicBool,
}

impl LinkState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// Map a client connection event onto the session's callbacks
///
/// A lost connection or a server error ends the session with an error
/// unless the session is already closing.
fn report_event(link: &LinkState, callbacks: &TransportCallbacks, event: Event) {
    match event {
        Event::Connected => {
            link.connected.store(true, Ordering::Release);
            debug!("NATS connection (re)established");
        }
        Event::Disconnected => {
            link.connected.store(false, Ordering::Release);
            if !link.is_closing() {
                warn!("NATS connection lost");
                callbacks.on_error("NATS connection lost");
            }
        }
        Event::ServerError(e) => {
            if !link.is_closing() {
                warn!("NATS server error: {}", e);
                callbacks.on_error(format!("NATS server error: {}", e));
            }
        }
        other => debug!("NATS event: {}", other),
    }
}

/// The server subject stopped delivering
fn subscription_ended(link: &LinkState, callbacks: &TransportCallbacks) {
    if link.is_closing() {
        debug!("Agent subscription ended after close");
        return;
    }
    warn!("Agent subscription ended unexpectedly");
    callbacks.on_error("agent subscription ended");
}

/// Bounded queue in front of the writer task
///
/// Frames are dropped while the link is down or the writer is behind.
struct OutboundQueue {
    tx: mpsc::Sender<MediaBlob>,
    link: Arc<LinkState>,
}

impl OutboundQueue {
    fn push(&self, blob: MediaBlob) -> bool {
        if !self.link.is_connected() {
            trace!("NATS disconnected; dropping frame");
            return false;
        }
        match self.tx.try_send(blob) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Outbound queue full; dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Audio writer gone; dropping frame");
                false
            }
        }
    }
}

/// Talks to the agent through a NATS relay
///
/// The relay receives the session setup, then `realtimeInput` messages,
/// and publishes `serverContent` messages back on the session's server
/// subject.
pub struct NatsTransport {
    url: String,
}

impl NatsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    async fn connect(
        &self,
        setup: &SessionSetup,
        link: Arc<LinkState>,
        callbacks: TransportCallbacks,
    ) -> anyhow::Result<(Client, async_nats::Subscriber)> {
        info!("Connecting to NATS at {}", self.url);

        let client = ConnectOptions::new()
            .event_callback(move |event| {
                let link = link.clone();
                let callbacks = callbacks.clone();
                async move { report_event(&link, &callbacks, event) }
            })
            .connect(self.url.as_str())
            .await
            .context("Failed to connect to NATS")?;

        let subjects = SessionSubjects::new(&setup.session_id);

        // Subscribe before announcing so no reply can be missed
        let subscriber = client
            .subscribe(subjects.server.clone())
            .await
            .context("Failed to subscribe to agent messages")?;

        let payload = serde_json::to_vec(setup)?;
        client
            .publish(subjects.setup.clone(), payload.into())
            .await
            .context("Failed to publish session setup")?;

        info!("Session {} announced on {}", setup.session_id, subjects.setup);

        Ok((client, subscriber))
    }
}

#[async_trait]
impl Transport for NatsTransport {
    async fn open(
        &self,
        setup: &SessionSetup,
        callbacks: TransportCallbacks,
    ) -> LiveResult<Box<dyn SessionHandle>> {
        let link = Arc::new(LinkState::new());
        let (client, mut subscriber) = self
            .connect(setup, link.clone(), callbacks.clone())
            .await
            .map_err(|e| LiveError::Transport(format!("{:#}", e)))?;

        let subjects = SessionSubjects::new(&setup.session_id);

        // Writer task keeps outbound frames in send order
        let (out_tx, mut out_rx) = mpsc::channel::<MediaBlob>(OUTBOUND_FRAMES);
        let writer_client = client.clone();
        let input_subject = subjects.input.clone();
        let writer_callbacks = callbacks.clone();
        let writer_link = link.clone();
        let writer = tokio::spawn(async move {
            let mut sequence: u64 = 0;
            while let Some(blob) = out_rx.recv().await {
                let message = RealtimeInputMessage::from(blob);
                let payload = match serde_json::to_vec(&message) {
                    Ok(p) => p,
                    Err(e) => {
                        error!("Failed to serialize audio frame: {}", e);
                        continue;
                    }
                };

                if let Err(e) = writer_client.publish(input_subject.clone(), payload.into()).await {
                    error!("Failed to publish audio frame: {}", e);
                    if !writer_link.is_closing() {
                        writer_callbacks.on_error(format!("publish failed: {}", e));
                    }
                    break;
                }
                sequence += 1;
            }
            debug!("Audio writer stopped after {} frames", sequence);
        });

        let reader_callbacks = callbacks.clone();
        let reader_link = link.clone();
        let reader = tokio::spawn(async move {
            reader_callbacks.on_open();

            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<ServerMessage>(&msg.payload) {
                    Ok(message) => reader_callbacks.on_message(InboundMessage::from(message)),
                    Err(e) => warn!("Failed to parse agent message: {}", e),
                }
            }

            subscription_ended(&reader_link, &reader_callbacks);
        });

        Ok(Box::new(NatsSessionHandle {
            client,
            close_subject: subjects.close,
            out: Some(OutboundQueue { tx: out_tx, link: link.clone() }),
            link,
            reader: Some(reader),
            writer: Some(writer),
        }))
    }

    fn name(&self) -> &str {
        "nats"
    }
}

struct NatsSessionHandle {
    client: Client,
    close_subject: String,
    out: Option<OutboundQueue>,
    link: Arc<LinkState>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl SessionHandle for NatsSessionHandle {
    fn send(&self, blob: MediaBlob) {
        if let Some(out) = &self.out {
            out.push(blob);
        }
    }

    fn close(&mut self) {
        let Some(out) = self.out.take() else {
            return;
        };
        info!("Closing NATS session");
        self.link.closing.store(true, Ordering::Release);

        // Let queued frames drain, then tell the relay the session is over
        drop(out);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let client = self.client.clone();
        let subject = self.close_subject.clone();
        let writer = self.writer.take();
        runtime.spawn(async move {
            if let Some(writer) = writer {
                let _ = writer.await;
            }
            if let Err(e) = client.publish(subject, Vec::new().into()).await {
                warn!("Failed to publish session close: {}", e);
            }
            if let Err(e) = client.flush().await {
                warn!("Failed to flush NATS connection: {}", e);
            }
        });
    }
}

impl Drop for NatsSessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
