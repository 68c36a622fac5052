pub mod backend;
pub mod capture;
pub mod clock_sink;
pub mod codec;
pub mod file;
pub mod manual;
pub mod playback;

pub use backend::{
    AudioFrame, BlockSender, CaptureConstraints, CompletionSender, DeviceStream, InputDevice,
    OutputDevice, OutputSink, PlaybackBuffer, SourceId,
};
pub use capture::CapturePipeline;
pub use clock_sink::ClockOutput;
pub use file::{WavClip, WavFileInput};
pub use manual::{ManualOutput, ManualSinkControl, ScriptedInput, ScriptedInputControl};
pub use playback::{PlaybackScheduler, PreparedChunk, ScheduledSource};
