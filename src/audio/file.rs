use anyhow::{Context, Result};
use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{BlockSender, CaptureConstraints, DeviceStream, InputDevice};
use crate::error::{LiveError, LiveResult};

/// A WAV file loaded as mono float samples
pub struct WavClip {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Channel count of the file before downmixing
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl WavClip {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
        };

        let channels = spec.channels.max(1) as usize;
        let samples: Vec<f32> = interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();

        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Microphone stand-in that replays a WAV file at real-time cadence
///
/// The file must already be at the requested capture rate. Once the clip
/// is exhausted the stream keeps delivering silent blocks, like an idle
/// microphone.
pub struct WavFileInput {
    path: PathBuf,
}

impl WavFileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl InputDevice for WavFileInput {
    async fn acquire(&mut self, constraints: &CaptureConstraints) -> LiveResult<Box<dyn DeviceStream>> {
        let path = self.path.clone();
        let clip = tokio::task::spawn_blocking(move || WavClip::open(path))
            .await
            .map_err(|e| LiveError::DeviceAcquisition(e.to_string()))?
            .map_err(|e| LiveError::DeviceAcquisition(format!("{:#}", e)))?;

        if clip.sample_rate != constraints.sample_rate {
            return Err(LiveError::DeviceAcquisition(format!(
                "{} is {}Hz, capture requires {}Hz",
                clip.path, clip.sample_rate, constraints.sample_rate
            )));
        }

        Ok(Box::new(WavFileStream {
            samples: clip.samples,
            sample_rate: clip.sample_rate,
            processor: None,
            live: true,
        }))
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

struct WavFileStream {
    samples: Vec<f32>,
    sample_rate: u32,
    processor: Option<JoinHandle<()>>,
    live: bool,
}

impl DeviceStream for WavFileStream {
    fn attach_processor(&mut self, block_size: usize, on_block: BlockSender) -> LiveResult<()> {
        if !self.live {
            return Err(LiveError::DeviceAcquisition("microphone tracks stopped".to_string()));
        }
        if block_size == 0 {
            return Err(LiveError::DeviceAcquisition("block size must be non-zero".to_string()));
        }
        self.detach_processor();

        let samples = std::mem::take(&mut self.samples);
        let period = Duration::from_secs_f64(block_size as f64 / self.sample_rate as f64);

        self.processor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut offset = 0;

            loop {
                ticker.tick().await;

                let mut block = vec![0.0f32; block_size];
                if offset < samples.len() {
                    let end = (offset + block_size).min(samples.len());
                    block[..end - offset].copy_from_slice(&samples[offset..end]);
                    offset = end;
                }

                if on_block.send(block).is_err() {
                    break;
                }
            }
            debug!("WAV capture processor stopped at sample {}", offset);
        }));
        Ok(())
    }

    fn detach_processor(&mut self) {
        if let Some(processor) = self.processor.take() {
            processor.abort();
        }
    }

    fn stop_tracks(&mut self) {
        self.detach_processor();
        self.live = false;
    }

    fn close(&mut self) {
        self.samples = Vec::new();
    }

    fn is_attached(&self) -> bool {
        self.processor.as_ref().is_some_and(|p| !p.is_finished())
    }
}
