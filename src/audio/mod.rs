// ABOUTME: Audio types and processing for the Sendspin player
// ABOUTME: Sample/frame types, PCM decoding, the ring buffer, gain and output backends

/// Output device boundary and the cpal backend
pub mod backend;
/// PCM decoder implementations
pub mod decode;
/// Volume state and the callback-side gain ramp
pub mod gain;
/// Timestamp-ordered buffer shared with the audio thread
pub mod ring_buffer;
/// Sync correction planner for drop/insert cadence
pub mod sync_correction;
/// Core audio type definitions (Sample, AudioFormat, AudioFrame)
pub mod types;

pub use backend::{AudioBackend, AudioDevice, CpalBackend, DeviceSelector, OutputHandle, RenderCallback};
pub use gain::{VolumeController, VolumeState};
pub use ring_buffer::{AudioRingBuffer, FrameWindow, PopReport, PushError};
pub use sync_correction::{CorrectionPlanner, CorrectionSchedule};
pub use types::{AudioFormat, AudioFrame, Sample};
