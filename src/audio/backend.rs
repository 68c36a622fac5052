use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

use crate::error::LiveResult;

/// Receives one fixed-size block of float samples per capture callback
pub type BlockSender = mpsc::UnboundedSender<Vec<f32>>;

/// Receives the id of every scheduled buffer whose playback has ended
pub type CompletionSender = mpsc::UnboundedSender<SourceId>;

/// One encoded capture block (16-bit PCM, mono)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Quantized samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFrame {
    /// MIME type announced to the agent alongside the payload
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Little-endian byte view of the samples
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Decoded inbound audio, owned by the playback scheduler until it ends
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    pub sample_rate: u32,
    /// De-interleaved samples, one vector per channel
    pub channels: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Handle to a buffer scheduled on an output sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Microphone request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub sample_rate: u32,
    pub channels: u16,
}

/// An acquired microphone
///
/// The processor is the node that delivers fixed-size blocks; it is attached
/// once the transport is open and detached on teardown.
pub trait DeviceStream: Send {
    /// Start delivering `block_size`-sample blocks to `on_block`
    fn attach_processor(&mut self, block_size: usize, on_block: BlockSender) -> LiveResult<()>;

    /// Stop delivering blocks; safe to call when nothing is attached
    fn detach_processor(&mut self);

    /// Release the underlying device tracks
    fn stop_tracks(&mut self);

    /// Close the capture-side audio context
    fn close(&mut self);

    fn is_attached(&self) -> bool;
}

/// Microphone provider
///
/// Implementations:
/// - `WavFileInput`: replays a WAV file at real-time cadence
/// - `ScriptedInput`: blocks pushed by the caller (tests, embedding)
#[async_trait]
pub trait InputDevice: Send {
    /// Acquire microphone access
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> LiveResult<Box<dyn DeviceStream>>;

    /// Device name for logging
    fn name(&self) -> &str;
}

/// Output sink with a monotonically advancing clock (seconds)
pub trait OutputSink: Send {
    fn clock_now(&self) -> f64;

    fn is_suspended(&self) -> bool;

    /// Resume the clock if suspended
    fn resume(&mut self) -> LiveResult<()>;

    /// Schedule `buffer` to begin at `start_time` on the sink clock
    ///
    /// The sink reports the returned id on its completion channel once
    /// playback ends naturally. Stopped sources are not reported.
    fn schedule(&mut self, buffer: PlaybackBuffer, start_time: f64) -> LiveResult<SourceId>;

    /// Stop a source immediately, whether scheduled or sounding
    fn stop(&mut self, id: SourceId) -> LiveResult<()>;

    fn close(&mut self);
}

/// Output sink provider
pub trait OutputDevice: Send {
    fn acquire_sink(
        &mut self,
        sample_rate: u32,
        channels: u16,
        completions: CompletionSender,
    ) -> LiveResult<Box<dyn OutputSink>>;

    fn name(&self) -> &str;
}
