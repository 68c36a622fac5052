//! Output sink driven by the runtime clock.
//!
//! Produces no sound: buffers are "played" by waiting out their scheduled
//! interval, after which the completion is reported. Used where no
//! hardware output is attached.

use std::collections::HashMap;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

use super::backend::{CompletionSender, OutputDevice, OutputSink, PlaybackBuffer, SourceId};
use crate::error::{LiveError, LiveResult};

#[derive(Default)]
pub struct ClockOutput;

impl ClockOutput {
    pub fn new() -> Self {
        Self
    }
}

impl OutputDevice for ClockOutput {
    fn acquire_sink(
        &mut self,
        sample_rate: u32,
        channels: u16,
        completions: CompletionSender,
    ) -> LiveResult<Box<dyn OutputSink>> {
        debug!("Clock sink created ({}Hz, {} channels)", sample_rate, channels);
        Ok(Box::new(ClockSink::new(completions)))
    }

    fn name(&self) -> &str {
        "clock"
    }
}

/// Sink whose clock starts suspended and runs in real time once resumed
pub struct ClockSink {
    /// Seconds accumulated before the current run
    elapsed: f64,
    resumed_at: Option<Instant>,
    next_id: u64,
    sources: HashMap<SourceId, JoinHandle<()>>,
    completions: CompletionSender,
}

impl ClockSink {
    pub fn new(completions: CompletionSender) -> Self {
        Self {
            elapsed: 0.0,
            resumed_at: None,
            next_id: 0,
            sources: HashMap::new(),
            completions,
        }
    }
}

impl OutputSink for ClockSink {
    fn clock_now(&self) -> f64 {
        self.elapsed + self.resumed_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }

    fn is_suspended(&self) -> bool {
        self.resumed_at.is_none()
    }

    fn resume(&mut self) -> LiveResult<()> {
        if self.resumed_at.is_none() {
            self.resumed_at = Some(Instant::now());
        }
        Ok(())
    }

    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> LiveResult<SourceId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LiveError::DeviceAcquisition(e.to_string()))?;

        self.sources.retain(|_, task| !task.is_finished());
        self.next_id += 1;
        let id = SourceId(self.next_id);

        let end_time = start_time + buffer.duration();
        let wait = Duration::from_secs_f64((end_time - self.clock_now()).max(0.0));
        let deadline = Instant::now() + wait;
        let completions = self.completions.clone();

        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = completions.send(id);
        });
        self.sources.insert(id, task);
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) -> LiveResult<()> {
        match self.sources.remove(&id) {
            Some(task) if !task.is_finished() => {
                task.abort();
                Ok(())
            }
            _ => Err(LiveError::SourceNotActive(id.0)),
        }
    }

    fn close(&mut self) {
        for (_, task) in self.sources.drain() {
            task.abort();
        }
        if let Some(resumed_at) = self.resumed_at.take() {
            self.elapsed += resumed_at.elapsed().as_secs_f64();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn buffer(secs: f64) -> PlaybackBuffer {
        PlaybackBuffer {
            sample_rate: 24000,
            channels: vec![vec![0.0; (24000.0 * secs) as usize]],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_frozen_until_resumed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut sink = ClockSink::new(tx);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(sink.is_suspended());
        assert_eq!(sink.clock_now(), 0.0);

        sink.resume().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!((sink.clock_now() - 0.5).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_fires_at_end_time() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ClockSink::new(tx);
        sink.resume().unwrap();

        let id = sink.schedule(buffer(0.5), 0.25).unwrap();

        tokio::time::advance(Duration::from_millis(700)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_eq!(rx.recv().await, Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_source_never_completes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ClockSink::new(tx);
        sink.resume().unwrap();

        let id = sink.schedule(buffer(0.5), 0.0).unwrap();
        sink.stop(id).unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        // Stopping twice reports the source as inactive
        assert!(matches!(sink.stop(id), Err(LiveError::SourceNotActive(_))));
    }
}
