use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::config::LiveSessionConfig;
use super::handle::Command;
use super::state::{PhaseEvent, SessionPhase, SessionState};
use super::stats::{SessionSnapshot, SessionStats};
use crate::audio::{
    CaptureConstraints, CapturePipeline, CompletionSender, InputDevice, OutputDevice,
    PlaybackScheduler, SourceId,
};
use crate::error::{LiveError, LiveResult};
use crate::transcript::TranscriptAssembler;
use crate::transport::{InboundMessage, SessionHandle, Transport, TransportCallbacks, TransportEvent};

/// Context of one started session, created fresh by every `start()`
struct ActiveSession {
    handle: Option<Box<dyn SessionHandle>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

#[derive(Debug, Default)]
struct Counters {
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    chunks_scheduled: u64,
    chunks_dropped: u64,
    interruptions: u64,
    turns_completed: u64,
}

/// What woke the coordinator loop
enum Wake {
    Command(Option<Command>),
    Transport(TransportEvent),
    Block(Vec<f32>),
    PlaybackEnded(SourceId),
}

async fn recv_opt<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Owns every component of a live conversation and serializes all events
/// through one logical execution context
///
/// Transport events, capture blocks and playback completions arrive on
/// channels and are handled one at a time, either by `run` or, for
/// callers driving the session themselves, by `drain_pending`.
pub struct LiveSession {
    config: LiveSessionConfig,
    transport: Box<dyn Transport>,
    input: Box<dyn InputDevice>,
    output: Box<dyn OutputDevice>,

    state: SessionState,
    playback: PlaybackScheduler,
    capture: CapturePipeline,
    transcript: TranscriptAssembler,

    active: Option<ActiveSession>,
    blocks: Option<mpsc::UnboundedReceiver<Vec<f32>>>,
    completions_tx: CompletionSender,
    completions_rx: mpsc::UnboundedReceiver<SourceId>,

    counters: Counters,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl LiveSession {
    pub fn new(
        config: LiveSessionConfig,
        transport: Box<dyn Transport>,
        input: Box<dyn InputDevice>,
        output: Box<dyn OutputDevice>,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(SessionSnapshot {
            status_text: SessionPhase::Idle.status_text().to_string(),
            ..SessionSnapshot::default()
        });

        info!(
            "Live session ready: transport={}, input={}, output={}",
            transport.name(),
            input.name(),
            output.name()
        );

        Self {
            playback: PlaybackScheduler::new(config.output_sample_rate, config.channels),
            capture: CapturePipeline::new(config.block_size, config.input_sample_rate, config.channels),
            config,
            transport,
            input,
            output,
            state: SessionState::new(),
            transcript: TranscriptAssembler::new(),
            active: None,
            blocks: None,
            completions_tx,
            completions_rx,
            counters: Counters::default(),
            snapshots,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn transcript(&self) -> &TranscriptAssembler {
        &self.transcript
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn capture(&self) -> &CapturePipeline {
        &self.capture
    }

    /// Whether a transport session handle is held
    pub fn has_session_handle(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.handle.is_some())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.counters.session_id.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        let duration_secs = self
            .counters
            .started_at
            .map(|started| {
                let end = self.counters.ended_at.unwrap_or_else(Utc::now);
                end.signed_duration_since(started).num_milliseconds() as f64 / 1000.0
            })
            .unwrap_or(0.0);

        SessionStats {
            started_at: self.counters.started_at,
            duration_secs,
            frames_sent: self.capture.frames_sent(),
            chunks_scheduled: self.counters.chunks_scheduled,
            chunks_dropped: self.counters.chunks_dropped,
            interruptions: self.counters.interruptions,
            turns_completed: self.counters.turns_completed,
            in_flight: self.playback.in_flight_count(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let phase = self.state.phase();
        SessionSnapshot {
            session_id: self.counters.session_id.clone(),
            phase,
            status_text: phase.status_text().to_string(),
            last_error: self.state.last_error().map(str::to_string),
            transcript: self.transcript.entries().to_vec(),
            stats: self.stats(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Start a conversation
    ///
    /// Only valid from `Idle` or `Error`; otherwise a no-op. Device or
    /// transport failures leave the session in `Error` with everything
    /// released. Nothing is retried.
    pub async fn start(&mut self) -> LiveResult<()> {
        let phase = self.state.phase();
        if !phase.can_start() {
            warn!("Live session already {:?}; ignoring start", phase);
            return Ok(());
        }

        self.state.apply(PhaseEvent::Start)?;
        self.playback.flush();
        self.transcript.begin_session();

        let session_id = uuid::Uuid::new_v4().to_string();
        info!("Starting live session: {}", session_id);
        self.counters = Counters {
            session_id: Some(session_id.clone()),
            started_at: Some(Utc::now()),
            ..Counters::default()
        };
        self.publish();

        if let Err(e) = self.acquire_devices().await {
            return Err(self.fail_start(e));
        }

        let (callbacks, events) = TransportCallbacks::channel();
        let setup = self.config.setup(&session_id);

        match self.transport.open(&setup, callbacks).await {
            Ok(handle) => {
                self.active = Some(ActiveSession {
                    handle: Some(handle),
                    events,
                });
                info!("Live session {} connecting via {}", session_id, self.transport.name());
                self.publish();
                Ok(())
            }
            Err(e) => Err(self.fail_start(e)),
        }
    }

    async fn acquire_devices(&mut self) -> LiveResult<()> {
        // The output sink is created once and reused across restarts
        self.playback.ensure_sink(self.output.as_mut(), &self.completions_tx)?;

        let constraints = CaptureConstraints {
            sample_rate: self.config.input_sample_rate,
            channels: self.config.channels,
        };
        let stream = self.input.acquire(&constraints).await?;
        debug!("Microphone acquired from {}", self.input.name());
        self.capture.install(stream);
        Ok(())
    }

    fn fail_start(&mut self, e: LiveError) -> LiveError {
        error!("Failed to start live session: {}", e);
        self.teardown();
        if let Err(invalid) = self.state.fail(e.to_string()) {
            debug!("{}", invalid);
        }
        self.publish();
        e
    }

    /// Stop the conversation from any phase; always lands on `Idle`
    pub fn stop(&mut self) {
        let was = self.state.phase();
        self.teardown();
        if let Err(e) = self.state.apply(PhaseEvent::Stop) {
            debug!("{}", e);
        }

        if was != SessionPhase::Idle {
            info!(
                "Live session {} stopped",
                self.counters.session_id.as_deref().unwrap_or("-")
            );
        }
        self.publish();
    }

    /// Release everything a session holds, in a fixed order
    fn teardown(&mut self) {
        self.playback.flush();

        if let Some(mut active) = self.active.take() {
            if let Some(mut handle) = active.handle.take() {
                handle.close();
            }
            active.events.close();
        }

        self.capture.detach();
        self.blocks = None;
        self.capture.release();

        self.transcript.end_session();

        if self.counters.started_at.is_some() && self.counters.ended_at.is_none() {
            self.counters.ended_at = Some(Utc::now());
        }
    }

    /// Transport failure: tear down, then surface `Error`
    fn fail_session(&mut self, reason: String) {
        error!("Live session error: {}", reason);
        self.teardown();
        if let Err(e) = self.state.fail(reason) {
            debug!("{}", e);
        }
        self.publish();
    }

    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.active.is_none() {
            debug!("Ignoring transport event outside a session: {:?}", event);
            return;
        }

        match event {
            TransportEvent::Open => self.on_transport_open(),
            TransportEvent::Message(message) => self.handle_message(message),
            TransportEvent::Error(reason) => self.fail_session(reason),
            TransportEvent::Close(reason) => {
                info!("Transport closed: {}", reason.as_deref().unwrap_or("remote close"));
                self.stop();
            }
        }
    }

    fn on_transport_open(&mut self) {
        if self.state.apply(PhaseEvent::TransportOpened).is_err() {
            debug!("Ignoring open in {:?}", self.state.phase());
            return;
        }

        match self.capture.attach() {
            Ok(blocks) => self.blocks = blocks,
            Err(e) => {
                self.fail_session(e.to_string());
                return;
            }
        }
        info!("Live session listening");
        self.publish();
    }

    fn handle_message(&mut self, message: InboundMessage) {
        if let Some(delta) = message.transcription {
            self.transcript.on_delta(delta.speaker, &delta.text);
        }

        if message.turn_complete {
            self.counters.turns_completed += 1;
            for entry in self.transcript.on_turn_complete() {
                debug!("{:?}: {}", entry.speaker, entry.text);
            }
        }

        if let Some(chunk) = message.audio_chunk {
            match self.playback.on_chunk_received(&mut self.state, &chunk) {
                Ok(Some(_)) => self.counters.chunks_scheduled += 1,
                Ok(None) => self.counters.chunks_dropped += 1,
                Err(e) => {
                    warn!("Dropping agent audio chunk: {}", e);
                    self.counters.chunks_dropped += 1;
                }
            }
        }

        if message.interrupted {
            info!("Agent interrupted; flushing {} sources", self.playback.in_flight_count());
            self.counters.interruptions += 1;
            self.playback.interrupt(&mut self.state);
        }

        self.publish();
    }

    /// Frame counts reach subscribers with the next phase or transcript
    /// change; `stats()` is always current.
    pub fn handle_capture_block(&mut self, samples: Vec<f32>) {
        let handle = self.active.as_ref().and_then(|a| a.handle.as_deref());
        self.capture.on_block(self.state.phase(), &samples, handle);
    }

    pub fn handle_playback_ended(&mut self, id: SourceId) {
        let was = self.state.phase();
        self.playback.on_source_ended(&mut self.state, id);
        if self.state.phase() != was {
            self.publish();
        }
    }

    /// Handle every event already queued, without waiting
    ///
    /// Returns the number of events handled.
    pub fn drain_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = self.active.as_mut().and_then(|a| a.events.try_recv().ok());
            if let Some(event) = event {
                self.handle_transport_event(event);
                handled += 1;
                continue;
            }

            let block = self.blocks.as_mut().and_then(|rx| rx.try_recv().ok());
            if let Some(block) = block {
                self.handle_capture_block(block);
                handled += 1;
                continue;
            }

            if let Ok(id) = self.completions_rx.try_recv() {
                self.handle_playback_ended(id);
                handled += 1;
                continue;
            }

            return handled;
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result.map(|_| self.snapshot()));
            }
            Command::Stop(reply) => {
                self.stop();
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Coordinator loop; returns when every command sender is gone
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Live session coordinator running");

        loop {
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                Some(event) = recv_opt(self.active.as_mut().map(|a| &mut a.events)) => Wake::Transport(event),
                Some(block) = recv_opt(self.blocks.as_mut()) => Wake::Block(block),
                Some(id) = self.completions_rx.recv() => Wake::PlaybackEnded(id),
            };

            match wake {
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Command(None) => break,
                Wake::Transport(event) => self.handle_transport_event(event),
                Wake::Block(block) => self.handle_capture_block(block),
                Wake::PlaybackEnded(id) => self.handle_playback_ended(id),
            }
        }

        self.stop();
        info!("Live session coordinator stopped");
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if self.active.is_some() || self.capture.has_stream() {
            self.stop();
        }
    }
}
