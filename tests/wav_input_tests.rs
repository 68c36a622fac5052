// Tests for the WAV-file microphone
//
// A short fixture is written to a temp dir and replayed through the
// DeviceStream contract.

use anyhow::Result;
use loqa_live::audio::{CaptureConstraints, InputDevice, WavClip, WavFileInput};
use loqa_live::LiveError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn write_fixture(dir: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<PathBuf> {
    let path = dir.join("mic.wav");
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(path)
}

fn constraints() -> CaptureConstraints {
    CaptureConstraints {
        sample_rate: 16000,
        channels: 1,
    }
}

#[test]
fn test_wav_clip_downmixes_to_mono() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Two stereo frames: (16384, 0) and (-16384, -16384)
    let path = write_fixture(temp_dir.path(), 16000, 2, &[16384, 0, -16384, -16384])?;

    let clip = WavClip::open(&path)?;

    assert_eq!(clip.channels, 2);
    assert_eq!(clip.samples, vec![0.25, -0.5]);
    assert!((clip.duration_seconds - 2.0 / 16000.0).abs() < 1e-12);
    Ok(())
}

#[tokio::test]
async fn test_wav_input_delivers_fixed_blocks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let samples: Vec<i16> = (0..1000).map(|i| (i % 100) as i16 * 100).collect();
    let path = write_fixture(temp_dir.path(), 16000, 1, &samples)?;

    let mut input = WavFileInput::new(path);
    let mut stream = input.acquire(&constraints()).await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    stream.attach_processor(512, tx)?;
    assert!(stream.is_attached());

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    let third = rx.recv().await.unwrap();

    assert_eq!(first.len(), 512);
    assert_eq!(second.len(), 512);
    assert_eq!(first[1], 100.0 / 32768.0);
    // Past the end of the clip the microphone is silent
    assert!(second[488..].iter().all(|&s| s == 0.0));
    assert!(third.iter().all(|&s| s == 0.0));

    stream.detach_processor();
    stream.stop_tracks();
    stream.close();
    assert!(!stream.is_attached());
    Ok(())
}

#[tokio::test]
async fn test_wav_input_rejects_wrong_rate() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_fixture(temp_dir.path(), 44100, 1, &[0; 100])?;

    let mut input = WavFileInput::new(path);
    let err = input.acquire(&constraints()).await.err().unwrap();

    assert!(matches!(err, LiveError::DeviceAcquisition(_)));
    Ok(())
}

#[tokio::test]
async fn test_missing_wav_is_acquisition_error() {
    let mut input = WavFileInput::new("/nonexistent/mic.wav");
    let err = input.acquire(&constraints()).await.err().unwrap();

    assert!(matches!(err, LiveError::DeviceAcquisition(_)));
}
