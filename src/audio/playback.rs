//! Gapless scheduling of inbound agent audio.
//!
//! Each decoded chunk is placed on the sink's clock at
//! `max(clock_now, next_start_time)`, so chunk `i + 1` never starts before
//! chunk `i` ends regardless of when it arrived.

use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use super::backend::{CompletionSender, OutputDevice, OutputSink, PlaybackBuffer, SourceId};
use super::codec;
use crate::error::{LiveError, LiveResult};
use crate::session::{PhaseEvent, SessionState};

/// A decoded chunk waiting to be committed to the timeline
#[derive(Debug)]
pub struct PreparedChunk {
    buffer: PlaybackBuffer,
    epoch: u64,
}

impl PreparedChunk {
    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }
}

/// A buffer bound to its slot on the sink timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_time: f64,
    pub end_time: f64,
}

/// Owns the output sink, the in-flight source set and the playback clock
pub struct PlaybackScheduler {
    sink: Option<Box<dyn OutputSink>>,
    sample_rate: u32,
    channels: u16,
    in_flight: BTreeSet<SourceId>,
    next_start_time: f64,
    /// Bumped on every flush; prepared chunks from an older epoch are stale
    epoch: u64,
}

impl PlaybackScheduler {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sink: None,
            sample_rate,
            channels,
            in_flight: BTreeSet::new(),
            next_start_time: 0.0,
            epoch: 0,
        }
    }

    /// Acquire the output sink once; later calls reuse it
    pub fn ensure_sink(
        &mut self,
        device: &mut dyn OutputDevice,
        completions: &CompletionSender,
    ) -> LiveResult<()> {
        if self.sink.is_none() {
            let sink = device.acquire_sink(self.sample_rate, self.channels, completions.clone())?;
            debug!(
                "Output sink acquired from {} ({}Hz, {} channels)",
                device.name(),
                self.sample_rate,
                self.channels
            );
            self.sink = Some(sink);
        }
        Ok(())
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_playing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// First half of chunk handling: mark speaking, resume the sink, decode
    ///
    /// On decode failure nothing is scheduled and, if no other audio is in
    /// flight, the phase falls back to listening.
    pub fn prepare(&mut self, state: &mut SessionState, encoded: &str) -> LiveResult<PreparedChunk> {
        let sink = self.sink.as_mut().ok_or(LiveError::NoOutputSink)?;
        state.apply(PhaseEvent::ChunkReceived)?;

        if sink.is_suspended() {
            if let Err(e) = sink.resume() {
                warn!("Failed to resume output sink: {}", e);
            }
        }

        let decoded = codec::decode(encoded)
            .and_then(|bytes| codec::decode_audio_data(&bytes, self.sample_rate, self.channels));

        match decoded {
            Ok(buffer) => Ok(PreparedChunk {
                buffer,
                epoch: self.epoch,
            }),
            Err(e) => {
                if self.in_flight.is_empty() {
                    let _ = state.apply(PhaseEvent::PlaybackDrained);
                }
                Err(e.into())
            }
        }
    }

    /// Second half: place the chunk on the timeline
    ///
    /// Returns `None` when the chunk was prepared before the last flush.
    pub fn commit(
        &mut self,
        state: &mut SessionState,
        chunk: PreparedChunk,
    ) -> LiveResult<Option<ScheduledSource>> {
        if chunk.epoch != self.epoch {
            debug!("Discarding chunk prepared before flush (epoch {} != {})", chunk.epoch, self.epoch);
            if self.in_flight.is_empty() {
                let _ = state.apply(PhaseEvent::PlaybackDrained);
            }
            return Ok(None);
        }
        let sink = self.sink.as_mut().ok_or(LiveError::NoOutputSink)?;

        let duration = chunk.buffer.duration();
        let start_time = sink.clock_now().max(self.next_start_time);

        let id = match sink.schedule(chunk.buffer, start_time) {
            Ok(id) => id,
            Err(e) => {
                if self.in_flight.is_empty() {
                    let _ = state.apply(PhaseEvent::PlaybackDrained);
                }
                return Err(e);
            }
        };

        self.in_flight.insert(id);
        self.next_start_time = start_time + duration;

        trace!(
            "Scheduled {} at {:.3}s for {:.3}s ({} in flight)",
            id,
            start_time,
            duration,
            self.in_flight.len()
        );

        Ok(Some(ScheduledSource {
            id,
            start_time,
            end_time: self.next_start_time,
        }))
    }

    /// Decode and schedule one inbound chunk
    pub fn on_chunk_received(
        &mut self,
        state: &mut SessionState,
        encoded: &str,
    ) -> LiveResult<Option<ScheduledSource>> {
        let chunk = self.prepare(state, encoded)?;
        self.commit(state, chunk)
    }

    /// Completion callback from the sink
    ///
    /// Ids not in flight (already flushed) are ignored.
    pub fn on_source_ended(&mut self, state: &mut SessionState, id: SourceId) {
        if !self.in_flight.remove(&id) {
            trace!("Ignoring completion for {} (not in flight)", id);
            return;
        }

        if self.in_flight.is_empty() {
            if let Err(e) = state.apply(PhaseEvent::PlaybackDrained) {
                debug!("Playback drained outside speaking: {}", e);
            }
        }
    }

    /// Barge-in: stop everything now and rewind the clock
    pub fn interrupt(&mut self, state: &mut SessionState) {
        self.flush();
        if let Err(e) = state.apply(PhaseEvent::Interrupted) {
            trace!("Interrupt ignored: {}", e);
        }
    }

    /// Stop every in-flight source, clear the set and reset the clock
    ///
    /// Safe on an empty set. Stop failures for sources that already ended
    /// are swallowed.
    pub fn flush(&mut self) {
        let sources = std::mem::take(&mut self.in_flight);
        if let Some(sink) = self.sink.as_mut() {
            for id in &sources {
                if let Err(e) = sink.stop(*id) {
                    trace!("Ignoring stop error for {}: {}", id, e);
                }
            }
        }

        if !sources.is_empty() {
            debug!("Flushed {} playback sources", sources.len());
        }

        self.next_start_time = 0.0;
        self.epoch += 1;
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.flush();
        if let Some(mut sink) = self.sink.take() {
            sink.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec;
    use crate::audio::manual::{ManualOutput, ManualSinkControl};
    use crate::session::SessionPhase;
    use tokio::sync::mpsc;

    /// Encoded mono chunk lasting `secs` at 24kHz
    fn chunk(secs: f64) -> String {
        codec::encode(&vec![0.1; (24000.0 * secs) as usize])
    }

    fn listening() -> SessionState {
        let mut state = SessionState::new();
        state.apply(PhaseEvent::Start).unwrap();
        state.apply(PhaseEvent::TransportOpened).unwrap();
        state
    }

    fn scheduler() -> (PlaybackScheduler, ManualSinkControl, mpsc::UnboundedReceiver<SourceId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut output = ManualOutput::new();
        let control = output.control();
        let mut scheduler = PlaybackScheduler::new(24000, 1);
        scheduler.ensure_sink(&mut output, &tx).unwrap();
        (scheduler, control, rx)
    }

    #[test]
    fn test_chunks_play_back_to_back() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        control.set_clock(0.0);
        let first = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();

        control.set_clock(0.3);
        let second = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();

        control.set_clock(1.2);
        let third = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();

        assert_eq!((first.start_time, first.end_time), (0.0, 0.5));
        assert_eq!((second.start_time, second.end_time), (0.5, 1.0));
        assert!((third.start_time - 1.2).abs() < 1e-9);
        assert!((third.end_time - 1.7).abs() < 1e-9);
        assert_eq!(state.phase(), SessionPhase::Speaking);
        assert_eq!(control.started_at(), vec![0.0, 0.5, third.start_time]);
    }

    #[test]
    fn test_intervals_never_overlap() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        let arrivals = [0.0, 0.05, 0.1, 0.9, 0.95, 3.0, 3.01];
        let durations = [0.2, 0.4, 0.1, 0.3, 0.25, 0.5, 0.1];
        let mut previous: Option<ScheduledSource> = None;

        for (at, secs) in arrivals.iter().zip(durations) {
            control.set_clock(*at);
            let source = scheduler.on_chunk_received(&mut state, &chunk(secs)).unwrap().unwrap();
            if let Some(prev) = previous {
                let expected = at.max(prev.end_time);
                assert!(source.start_time >= prev.end_time - 1e-9);
                assert!((source.start_time - expected).abs() < 1e-9);
            }
            previous = Some(source);
        }
    }

    #[test]
    fn test_completion_returns_to_listening_when_drained() {
        let (mut scheduler, _control, _rx) = scheduler();
        let mut state = listening();

        let a = scheduler.on_chunk_received(&mut state, &chunk(0.1)).unwrap().unwrap();
        let b = scheduler.on_chunk_received(&mut state, &chunk(0.1)).unwrap().unwrap();

        scheduler.on_source_ended(&mut state, a.id);
        assert_eq!(state.phase(), SessionPhase::Speaking);

        scheduler.on_source_ended(&mut state, b.id);
        assert_eq!(state.phase(), SessionPhase::Listening);
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_interrupt_flushes_and_resets_clock() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap();
        scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap();

        scheduler.interrupt(&mut state);

        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(state.phase(), SessionPhase::Listening);
        assert_eq!(control.stopped().len(), 2);

        // Calling again on an empty set is a no-op
        scheduler.interrupt(&mut state);
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(state.phase(), SessionPhase::Listening);
    }

    #[test]
    fn test_stop_errors_are_swallowed() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        let source = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();
        // Source finished on the sink but its completion has not been handled yet
        control.finish_silently(source.id);

        scheduler.interrupt(&mut state);
        assert_eq!(scheduler.in_flight_count(), 0);
    }

    #[test]
    fn test_late_completion_after_interrupt_ignored() {
        let (mut scheduler, _control, _rx) = scheduler();
        let mut state = listening();

        let stale = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();
        scheduler.interrupt(&mut state);

        let fresh = scheduler.on_chunk_received(&mut state, &chunk(0.5)).unwrap().unwrap();
        scheduler.on_source_ended(&mut state, stale.id);

        assert_eq!(state.phase(), SessionPhase::Speaking);
        assert_eq!(scheduler.in_flight_count(), 1);

        scheduler.on_source_ended(&mut state, fresh.id);
        assert_eq!(state.phase(), SessionPhase::Listening);
    }

    #[test]
    fn test_chunk_prepared_before_interrupt_is_discarded() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        let pending = scheduler.prepare(&mut state, &chunk(0.5)).unwrap();
        scheduler.interrupt(&mut state);

        assert!(scheduler.commit(&mut state, pending).unwrap().is_none());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert!(control.started_at().is_empty());
        assert_eq!(state.phase(), SessionPhase::Listening);
    }

    #[test]
    fn test_chunk_prepared_before_flush_leaves_listening() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        let pending = scheduler.prepare(&mut state, &chunk(0.5)).unwrap();
        assert_eq!(state.phase(), SessionPhase::Speaking);
        scheduler.flush();

        assert!(scheduler.commit(&mut state, pending).unwrap().is_none());
        assert_eq!(scheduler.in_flight_count(), 0);
        assert!(control.started_at().is_empty());
        assert_eq!(state.phase(), SessionPhase::Listening);
    }

    #[test]
    fn test_stale_chunk_keeps_speaking_while_sources_play() {
        let (mut scheduler, _control, _rx) = scheduler();
        let mut state = listening();

        let pending = scheduler.prepare(&mut state, &chunk(0.5)).unwrap();
        scheduler.flush();
        scheduler.on_chunk_received(&mut state, &chunk(0.2)).unwrap().unwrap();

        assert!(scheduler.commit(&mut state, pending).unwrap().is_none());
        assert_eq!(scheduler.in_flight_count(), 1);
        assert_eq!(state.phase(), SessionPhase::Speaking);
    }

    #[test]
    fn test_decode_error_drops_chunk_only() {
        let (mut scheduler, _control, _rx) = scheduler();
        let mut state = listening();

        let err = scheduler.on_chunk_received(&mut state, "AAAA").unwrap_err();
        assert!(matches!(err, LiveError::Decode(_)));
        assert_eq!(state.phase(), SessionPhase::Listening);

        let ok = scheduler.on_chunk_received(&mut state, &chunk(0.2)).unwrap().unwrap();
        assert_eq!(ok.start_time, 0.0);

        // A bad chunk mid-stream keeps the agent speaking
        assert!(scheduler.on_chunk_received(&mut state, "%%%").is_err());
        assert_eq!(state.phase(), SessionPhase::Speaking);
        assert_eq!(scheduler.next_start_time(), ok.end_time);
    }

    #[test]
    fn test_resumes_suspended_sink() {
        let (mut scheduler, control, _rx) = scheduler();
        let mut state = listening();

        assert!(control.is_suspended());
        scheduler.on_chunk_received(&mut state, &chunk(0.1)).unwrap();
        assert!(!control.is_suspended());
    }

    #[test]
    fn test_chunk_without_sink_fails() {
        let mut scheduler = PlaybackScheduler::new(24000, 1);
        let mut state = listening();

        assert!(matches!(
            scheduler.on_chunk_received(&mut state, &chunk(0.1)),
            Err(LiveError::NoOutputSink)
        ));
        assert_eq!(state.phase(), SessionPhase::Listening);
    }
}
