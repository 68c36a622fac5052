//! Deterministic in-memory devices.
//!
//! `ManualOutput` hands out a sink whose clock only moves when told to, and
//! `ScriptedInput` a microphone whose blocks are pushed by the caller. Both
//! expose a cloneable control handle for driving and inspecting them.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{
    BlockSender, CaptureConstraints, CompletionSender, DeviceStream, InputDevice, OutputDevice,
    OutputSink, PlaybackBuffer, SourceId,
};
use crate::error::{LiveError, LiveResult};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy)]
struct ManualSource {
    end_time: f64,
}

#[derive(Default)]
struct ManualSinkState {
    clock: f64,
    suspended: bool,
    next_id: u64,
    active: BTreeMap<SourceId, ManualSource>,
    started_at: Vec<f64>,
    stopped: Vec<SourceId>,
    completions: Option<CompletionSender>,
    acquire_error: Option<String>,
    acquired: usize,
    closed: bool,
}

/// Control handle for sinks produced by a [`ManualOutput`]
#[derive(Clone, Default)]
pub struct ManualSinkControl {
    state: Arc<Mutex<ManualSinkState>>,
}

impl ManualSinkControl {
    /// Set the clock without firing completions
    pub fn set_clock(&self, now: f64) {
        lock(&self.state).clock = now;
    }

    /// Move the clock to `now` and report every source that has ended
    pub fn advance_to(&self, now: f64) -> Vec<SourceId> {
        let mut state = lock(&self.state);
        state.clock = now;

        let ended: Vec<SourceId> = state
            .active
            .iter()
            .filter(|(_, source)| source.end_time <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &ended {
            state.active.remove(id);
            if let Some(tx) = &state.completions {
                let _ = tx.send(*id);
            }
        }
        ended
    }

    /// Report one source as ended regardless of the clock
    pub fn complete(&self, id: SourceId) -> bool {
        let mut state = lock(&self.state);
        if state.active.remove(&id).is_none() {
            return false;
        }
        if let Some(tx) = &state.completions {
            let _ = tx.send(id);
        }
        true
    }

    /// End a source on the sink without reporting it yet
    pub fn finish_silently(&self, id: SourceId) {
        lock(&self.state).active.remove(&id);
    }

    /// Make the next `acquire_sink` fail
    pub fn fail_acquire(&self, reason: impl Into<String>) {
        lock(&self.state).acquire_error = Some(reason.into());
    }

    pub fn clock(&self) -> f64 {
        lock(&self.state).clock
    }

    pub fn is_suspended(&self) -> bool {
        lock(&self.state).suspended
    }

    /// Start times of every buffer scheduled so far, in order
    pub fn started_at(&self) -> Vec<f64> {
        lock(&self.state).started_at.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        lock(&self.state).stopped.clone()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.state).active.len()
    }

    pub fn acquired(&self) -> usize {
        lock(&self.state).acquired
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

/// Output device backed by a manually driven clock
#[derive(Default)]
pub struct ManualOutput {
    control: ManualSinkControl,
}

impl ManualOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> ManualSinkControl {
        self.control.clone()
    }
}

impl OutputDevice for ManualOutput {
    fn acquire_sink(
        &mut self,
        _sample_rate: u32,
        _channels: u16,
        completions: CompletionSender,
    ) -> LiveResult<Box<dyn OutputSink>> {
        let mut state = lock(&self.control.state);
        if let Some(reason) = state.acquire_error.take() {
            return Err(LiveError::DeviceAcquisition(reason));
        }

        state.acquired += 1;
        state.suspended = true;
        state.closed = false;
        state.completions = Some(completions);

        Ok(Box::new(ManualSink {
            control: self.control.clone(),
        }))
    }

    fn name(&self) -> &str {
        "manual"
    }
}

struct ManualSink {
    control: ManualSinkControl,
}

impl OutputSink for ManualSink {
    fn clock_now(&self) -> f64 {
        self.control.clock()
    }

    fn is_suspended(&self) -> bool {
        self.control.is_suspended()
    }

    fn resume(&mut self) -> LiveResult<()> {
        lock(&self.control.state).suspended = false;
        Ok(())
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> LiveResult<SourceId> {
        let mut state = lock(&self.control.state);
        state.next_id += 1;
        let id = SourceId(state.next_id);

        state.active.insert(
            id,
            ManualSource {
                end_time: start_time + buffer.duration(),
            },
        );
        state.started_at.push(start_time);
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) -> LiveResult<()> {
        let mut state = lock(&self.control.state);
        match state.active.remove(&id) {
            Some(_) => {
                state.stopped.push(id);
                Ok(())
            }
            None => Err(LiveError::SourceNotActive(id.0)),
        }
    }

    fn close(&mut self) {
        let mut state = lock(&self.control.state);
        state.closed = true;
        state.completions = None;
    }
}

#[derive(Default)]
struct ScriptedInputState {
    acquire_error: Option<String>,
    acquired: usize,
    block_size: usize,
    on_block: Option<BlockSender>,
    tracks_stopped: usize,
    contexts_closed: usize,
}

/// Control handle for a [`ScriptedInput`]
#[derive(Clone, Default)]
pub struct ScriptedInputControl {
    state: Arc<Mutex<ScriptedInputState>>,
}

impl ScriptedInputControl {
    /// Deliver one block as if the hardware callback fired
    ///
    /// Returns false when no processor is attached.
    pub fn push_block(&self, samples: Vec<f32>) -> bool {
        match &lock(&self.state).on_block {
            Some(tx) => tx.send(samples).is_ok(),
            None => false,
        }
    }

    /// Make the next acquisition fail
    pub fn fail_acquire(&self, reason: impl Into<String>) {
        lock(&self.state).acquire_error = Some(reason.into());
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.state).on_block.is_some()
    }

    /// Block size requested by the attached processor
    pub fn block_size(&self) -> usize {
        lock(&self.state).block_size
    }

    pub fn acquired(&self) -> usize {
        lock(&self.state).acquired
    }

    pub fn tracks_stopped(&self) -> usize {
        lock(&self.state).tracks_stopped
    }

    pub fn contexts_closed(&self) -> usize {
        lock(&self.state).contexts_closed
    }
}

/// Microphone whose blocks are supplied through its control handle
#[derive(Default)]
pub struct ScriptedInput {
    control: ScriptedInputControl,
}

impl ScriptedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> ScriptedInputControl {
        self.control.clone()
    }
}

#[async_trait]
impl InputDevice for ScriptedInput {
    async fn acquire(&mut self, _constraints: &CaptureConstraints) -> LiveResult<Box<dyn DeviceStream>> {
        let mut state = lock(&self.control.state);
        if let Some(reason) = state.acquire_error.take() {
            return Err(LiveError::DeviceAcquisition(reason));
        }
        state.acquired += 1;

        Ok(Box::new(ScriptedStream {
            control: self.control.clone(),
            live: true,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedStream {
    control: ScriptedInputControl,
    live: bool,
}

impl DeviceStream for ScriptedStream {
    fn attach_processor(&mut self, block_size: usize, on_block: BlockSender) -> LiveResult<()> {
        if !self.live {
            return Err(LiveError::DeviceAcquisition("microphone tracks stopped".to_string()));
        }
        let mut state = lock(&self.control.state);
        state.block_size = block_size;
        state.on_block = Some(on_block);
        Ok(())
    }

    fn detach_processor(&mut self) {
        lock(&self.control.state).on_block = None;
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            lock(&self.control.state).tracks_stopped += 1;
        }
    }

    fn close(&mut self) {
        lock(&self.control.state).contexts_closed += 1;
    }

    fn is_attached(&self) -> bool {
        self.control.is_attached()
    }
}
