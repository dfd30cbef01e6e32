// ABOUTME: Core audio type definitions
// ABOUTME: Sample (24-bit), AudioFormat and the timestamped AudioFrame

use std::sync::Arc;

/// 24-bit audio sample stored in i32
/// Range: -8388608 to 8388607 (±2^23)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Sample(pub i32);

impl Sample {
    /// Maximum valid 24-bit sample value (2^23 - 1)
    pub const MAX: Self = Self(8_388_607);
    /// Minimum valid 24-bit sample value (-2^23)
    pub const MIN: Self = Self(-8_388_608);
    /// Zero sample value
    pub const ZERO: Self = Self(0);

    /// Convert from 16-bit sample (shift left 8 bits)
    #[inline]
    pub fn from_i16(s: i16) -> Self {
        Self((s as i32) << 8)
    }

    /// Convert from 24-bit little-endian bytes
    #[inline]
    pub fn from_i24_le(bytes: [u8; 3]) -> Self {
        let val = (bytes[0] as i32) | ((bytes[1] as i32) << 8) | ((bytes[2] as i32) << 16);
        Self(sign_extend_24(val))
    }

    /// Convert from 24-bit big-endian bytes
    #[inline]
    pub fn from_i24_be(bytes: [u8; 3]) -> Self {
        let val = (bytes[2] as i32) | ((bytes[1] as i32) << 8) | ((bytes[0] as i32) << 16);
        Self(sign_extend_24(val))
    }

    /// Normalize to the `[-1.0, 1.0]` range expected by output devices
    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / 8_388_608.0
    }
}

#[inline]
fn sign_extend_24(val: i32) -> i32 {
    (val << 8) >> 8
}

/// PCM stream format announced by the server on stream start
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 48000)
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u8,
    /// Bit depth per sample (16 or 24)
    pub bit_depth: u8,
}

impl AudioFormat {
    /// Duration of `frames` sample frames in microseconds.
    pub fn frames_to_us(&self, frames: usize) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (frames as i64 * 1_000_000) / self.sample_rate as i64
    }
}

/// Decoded, interleaved audio that must start playing at a server timestamp.
///
/// Frames are immutable; cloning only bumps the sample `Arc`.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    play_at_server_us: i64,
    end_server_us: i64,
    samples: Arc<[Sample]>,
    channels: u8,
    sample_rate: u32,
}

impl AudioFrame {
    /// Create a frame from interleaved samples.
    ///
    /// `channels` and `sample_rate` of zero are clamped to one so that
    /// duration arithmetic never divides by zero.
    pub fn new(play_at_server_us: i64, samples: Arc<[Sample]>, channels: u8, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let sample_rate = sample_rate.max(1);
        let frames = (samples.len() / channels as usize) as i64;
        let duration_us = (frames * 1_000_000) / sample_rate as i64;
        Self {
            play_at_server_us,
            end_server_us: play_at_server_us + duration_us,
            samples,
            channels,
            sample_rate,
        }
    }

    /// Server time at which the first sample plays.
    pub fn play_at_server_us(&self) -> i64 {
        self.play_at_server_us
    }

    /// Server time just past the last sample.
    pub fn end_server_us(&self) -> i64 {
        self.end_server_us
    }

    /// Length of the frame in microseconds.
    pub fn duration_us(&self) -> i64 {
        self.end_server_us - self.play_at_server_us
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of interleaved channels.
    pub fn channel_count(&self) -> u8 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// True when `[start, end)` intersects this frame's time range.
    pub fn overlaps(&self, start_us: i64, end_us: i64) -> bool {
        self.play_at_server_us < end_us && start_us < self.end_server_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i24_sign_extension() {
        assert_eq!(Sample::from_i24_le([0xFF, 0xFF, 0xFF]), Sample(-1));
        assert_eq!(Sample::from_i24_be([0x80, 0x00, 0x00]), Sample::MIN);
        assert_eq!(Sample::from_i24_le([0xFF, 0xFF, 0x7F]), Sample::MAX);
    }

    #[test]
    fn test_frame_duration_from_sample_count() {
        // 960 stereo frames at 48kHz = 20ms
        let samples: Arc<[Sample]> = vec![Sample::ZERO; 960 * 2].into();
        let frame = AudioFrame::new(1_000, samples, 2, 48_000);
        assert_eq!(frame.duration_us(), 20_000);
        assert_eq!(frame.end_server_us(), 21_000);
        assert_eq!(frame.frame_count(), 960);
    }

    #[test]
    fn test_overlap_is_half_open() {
        let samples: Arc<[Sample]> = vec![Sample::ZERO; 48].into();
        let frame = AudioFrame::new(0, samples, 1, 48_000); // [0, 1000)
        assert!(frame.overlaps(0, 1));
        assert!(frame.overlaps(999, 2_000));
        assert!(!frame.overlaps(1_000, 2_000));
        assert!(!frame.overlaps(-500, 0));
    }
}
