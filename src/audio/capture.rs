use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::backend::{AudioFrame, DeviceStream};
use super::codec;
use crate::error::LiveResult;
use crate::session::SessionPhase;
use crate::transport::{MediaBlob, SessionHandle};

/// Microphone → codec → transport
///
/// Holds the acquired device stream. The processor is attached only once
/// the transport is open; blocks are dropped unless the session is
/// listening or speaking and a handle is present.
pub struct CapturePipeline {
    stream: Option<Box<dyn DeviceStream>>,
    block_size: usize,
    sample_rate: u32,
    channels: u16,
    frames_sent: u64,
}

impl CapturePipeline {
    pub fn new(block_size: usize, sample_rate: u32, channels: u16) -> Self {
        Self {
            stream: None,
            block_size,
            sample_rate,
            channels,
            frames_sent: 0,
        }
    }

    /// Take ownership of a freshly acquired microphone
    pub fn install(&mut self, stream: Box<dyn DeviceStream>) {
        if self.stream.is_some() {
            self.release();
        }
        self.stream = Some(stream);
        self.frames_sent = 0;
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_attached())
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Attach the block processor; blocks arrive on the returned receiver
    pub fn attach(&mut self) -> LiveResult<Option<mpsc::UnboundedReceiver<Vec<f32>>>> {
        let Some(stream) = self.stream.as_mut() else {
            warn!("No microphone stream to attach");
            return Ok(None);
        };

        let (tx, rx) = mpsc::unbounded_channel();
        stream.attach_processor(self.block_size, tx)?;
        debug!(
            "Capture processor attached ({} samples @ {}Hz)",
            self.block_size, self.sample_rate
        );
        Ok(Some(rx))
    }

    /// Encode one block and hand it to the transport without waiting
    pub fn on_block(
        &mut self,
        phase: SessionPhase,
        samples: &[f32],
        handle: Option<&dyn SessionHandle>,
    ) -> Option<AudioFrame> {
        if !phase.is_capturing() || !self.is_attached() {
            trace!("Dropping capture block in {:?}", phase);
            return None;
        }
        let handle = handle?;

        if samples.len() != self.block_size {
            trace!("Capture block of {} samples (expected {})", samples.len(), self.block_size);
        }

        let frame = codec::encode_frame(samples, self.sample_rate, self.channels);
        handle.send(MediaBlob {
            data: codec::encode_bytes(&frame.to_le_bytes()),
            mime_type: frame.mime_type(),
        });
        self.frames_sent += 1;

        Some(frame)
    }

    /// Disconnect the processor node
    pub fn detach(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            if stream.is_attached() {
                debug!("Capture processor detached after {} frames", self.frames_sent);
            }
            stream.detach_processor();
        }
    }

    /// Stop microphone tracks and close the capture context
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.detach_processor();
            stream.stop_tracks();
            stream.close();
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.release();
    }
}
