//! In-process transport driven through a control handle.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::messages::{MediaBlob, SessionSetup};
use super::{InboundMessage, SessionHandle, Transport, TransportCallbacks};
use crate::error::{LiveError, LiveResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct MemoryState {
    /// Callbacks of the most recently opened session
    callbacks: Option<TransportCallbacks>,
    generation: u64,
    auto_open: bool,
    open_error: Option<String>,
    setups: Vec<SessionSetup>,
    sent: Vec<MediaBlob>,
    open_handles: usize,
    closes: usize,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            callbacks: None,
            generation: 0,
            auto_open: true,
            open_error: None,
            setups: Vec::new(),
            sent: Vec::new(),
            open_handles: 0,
            closes: 0,
        }
    }
}

/// Plays the agent side of a [`MemoryTransport`]
#[derive(Clone, Default)]
pub struct MemoryTransportControl {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransportControl {
    fn callbacks(&self) -> Option<TransportCallbacks> {
        lock(&self.state).callbacks.clone()
    }

    /// Callbacks of the current session, for replaying late events
    pub fn current_callbacks(&self) -> Option<TransportCallbacks> {
        self.callbacks()
    }

    /// Whether `open` fires `onopen` immediately (default true)
    pub fn set_auto_open(&self, auto_open: bool) {
        lock(&self.state).auto_open = auto_open;
    }

    /// Make the next `open` fail synchronously
    pub fn fail_open(&self, reason: impl Into<String>) {
        lock(&self.state).open_error = Some(reason.into());
    }

    pub fn signal_open(&self) -> bool {
        self.callbacks().map(|cb| cb.on_open()).is_some()
    }

    pub fn deliver(&self, message: InboundMessage) -> bool {
        self.callbacks().map(|cb| cb.on_message(message)).is_some()
    }

    pub fn signal_error(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.callbacks().map(|cb| cb.on_error(reason)).is_some()
    }

    pub fn signal_close(&self) -> bool {
        self.callbacks().map(|cb| cb.on_close(None)).is_some()
    }

    /// Blobs sent by every session so far
    pub fn sent(&self) -> Vec<MediaBlob> {
        lock(&self.state).sent.clone()
    }

    pub fn setups(&self) -> Vec<SessionSetup> {
        lock(&self.state).setups.clone()
    }

    pub fn open_handles(&self) -> usize {
        lock(&self.state).open_handles
    }

    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }
}

/// Transport whose agent side is scripted through [`MemoryTransportControl`]
#[derive(Default)]
pub struct MemoryTransport {
    control: MemoryTransportControl,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> MemoryTransportControl {
        self.control.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(
        &self,
        setup: &SessionSetup,
        callbacks: TransportCallbacks,
    ) -> LiveResult<Box<dyn SessionHandle>> {
        let mut state = lock(&self.control.state);
        if let Some(reason) = state.open_error.take() {
            return Err(LiveError::Transport(reason));
        }

        state.generation += 1;
        state.open_handles += 1;
        state.setups.push(setup.clone());
        if state.auto_open {
            callbacks.on_open();
        }
        state.callbacks = Some(callbacks);
        debug!("Memory session {} opened", setup.session_id);

        Ok(Box::new(MemorySessionHandle {
            control: self.control.clone(),
            generation: state.generation,
            open: true,
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySessionHandle {
    control: MemoryTransportControl,
    generation: u64,
    open: bool,
}

impl SessionHandle for MemorySessionHandle {
    fn send(&self, blob: MediaBlob) {
        if self.open {
            lock(&self.control.state).sent.push(blob);
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        let mut state = lock(&self.control.state);
        state.open_handles -= 1;
        state.closes += 1;
        if state.generation == self.generation {
            state.callbacks = None;
        }
    }
}

impl Drop for MemorySessionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
