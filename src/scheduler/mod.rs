// ABOUTME: Playback scheduling driven by the audio device callback
// ABOUTME: Shared playback context, timing metrics and the drift-correcting scheduler

/// Callback-side scheduler and its shared state
pub mod playback;

pub use playback::{PlaybackContext, PlaybackMetrics, PlaybackScheduler, TimingMetrics};
