// ABOUTME: Lock-free group/player volume control and per-frame gain ramp
// ABOUTME: Packs both volume/mute pairs into one atomic so the audio thread never reads a torn state

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const GROUP_VOLUME_SHIFT: u32 = 0;
const GROUP_MUTED_BIT: u32 = 1 << 8;
const PLAYER_VOLUME_SHIFT: u32 = 16;
const PLAYER_MUTED_BIT: u32 = 1 << 24;

/// Both volume/mute pairs as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    /// Volume set by the group controller (0-100)
    pub group_volume: u8,
    /// Mute set by the group controller
    pub group_muted: bool,
    /// This player's own volume (0-100)
    pub player_volume: u8,
    /// This player's own mute
    pub player_muted: bool,
}

impl VolumeState {
    fn pack(self) -> u32 {
        let mut bits = (u32::from(self.group_volume) << GROUP_VOLUME_SHIFT)
            | (u32::from(self.player_volume) << PLAYER_VOLUME_SHIFT);
        if self.group_muted {
            bits |= GROUP_MUTED_BIT;
        }
        if self.player_muted {
            bits |= PLAYER_MUTED_BIT;
        }
        bits
    }

    fn unpack(bits: u32) -> Self {
        Self {
            group_volume: ((bits >> GROUP_VOLUME_SHIFT) & 0xFF) as u8,
            group_muted: bits & GROUP_MUTED_BIT != 0,
            player_volume: ((bits >> PLAYER_VOLUME_SHIFT) & 0xFF) as u8,
            player_muted: bits & PLAYER_MUTED_BIT != 0,
        }
    }

    /// Linear gain in `[0.0, 1.0]`: zero if either side is muted, otherwise
    /// the product of both volumes.
    pub fn effective_gain(&self) -> f32 {
        if self.group_muted || self.player_muted {
            return 0.0;
        }
        (f32::from(self.group_volume) / 100.0) * (f32::from(self.player_volume) / 100.0)
    }
}

/// Shared volume/mute control for the group and the local player.
///
/// All methods are lock-free and safe to call from any thread. Cloning is
/// cheap (single `Arc` increment) and clones share state.
#[derive(Clone)]
pub struct VolumeController {
    state: Arc<AtomicU32>,
}

impl VolumeController {
    /// Create a controller with the group at full volume and the player at
    /// `player_volume` / `player_muted`.
    pub fn new(player_volume: u8, player_muted: bool) -> Self {
        let state = VolumeState {
            group_volume: 100,
            group_muted: false,
            player_volume: player_volume.min(100),
            player_muted,
        };
        Self {
            state: Arc::new(AtomicU32::new(state.pack())),
        }
    }

    /// Apply a volume/mute pair from an inbound controller event.
    pub fn set_group_volume(&self, volume: u8, muted: bool) {
        self.modify(|state| {
            state.group_volume = volume.min(100);
            state.group_muted = muted;
        });
    }

    /// Apply a volume/mute pair chosen by the local user. Values above 100
    /// are clamped to 100.
    pub fn set_player_volume(&self, volume: u8, muted: bool) {
        self.modify(|state| {
            state.player_volume = volume.min(100);
            state.player_muted = muted;
        });
    }

    /// Return the group pair to full volume, unmuted. The player pair is
    /// local and survives reconnects.
    pub fn reset_group(&self) {
        self.set_group_volume(100, false);
    }

    /// Snapshot of both pairs, read in one atomic load.
    pub fn state(&self) -> VolumeState {
        VolumeState::unpack(self.state.load(Ordering::Relaxed))
    }

    /// Group volume and mute.
    pub fn group_volume(&self) -> (u8, bool) {
        let state = self.state();
        (state.group_volume, state.group_muted)
    }

    /// Player volume and mute.
    pub fn player_volume(&self) -> (u8, bool) {
        let state = self.state();
        (state.player_volume, state.player_muted)
    }

    /// Gain the playback scheduler should ramp toward.
    pub fn effective_gain(&self) -> f32 {
        self.state().effective_gain()
    }

    fn modify(&self, f: impl Fn(&mut VolumeState)) {
        let _ = self
            .state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let mut state = VolumeState::unpack(bits);
                f(&mut state);
                Some(state.pack())
            });
    }
}

impl fmt::Debug for VolumeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("VolumeController")
            .field("group_volume", &state.group_volume)
            .field("group_muted", &state.group_muted)
            .field("player_volume", &state.player_volume)
            .field("player_muted", &state.player_muted)
            .finish()
    }
}

/// Linear fade toward the latest target gain, 20 ms long.
///
/// Steps once per output frame, so every channel of a frame gets the same
/// factor and the fade length does not depend on the channel count.
pub(crate) struct GainRamp {
    /// Frames per fade. Zero at very low rates, where changes snap.
    length: u32,
    gain: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainRamp {
    /// Start at `initial_gain` with no fade in progress.
    pub(crate) fn new(sample_rate: u32, initial_gain: f32) -> Self {
        let gain = if initial_gain.is_finite() {
            initial_gain.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            length: sample_rate / 50,
            gain,
            target: gain,
            step: 0.0,
            remaining: 0,
        }
    }

    fn retarget(&mut self, target: f32) {
        if !target.is_finite() {
            return;
        }
        let target = target.clamp(0.0, 1.0);
        if target == self.target {
            return;
        }
        self.target = target;
        if self.length == 0 {
            self.gain = target;
            self.remaining = 0;
        } else {
            self.remaining = self.length;
            self.step = (target - self.gain) / self.length as f32;
        }
    }

    fn next_gain(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.gain = if self.remaining == 0 {
                self.target
            } else {
                (self.gain + self.step).clamp(0.0, 1.0)
            };
        }
        self.gain
    }

    /// Run the fade through `frames` frames of silence.
    pub(crate) fn advance(&mut self, frames: usize, target: f32) {
        if frames == 0 {
            return;
        }
        self.retarget(target);
        let frames = u32::try_from(frames).unwrap_or(u32::MAX);
        if frames >= self.remaining {
            self.remaining = 0;
            self.gain = self.target;
        } else {
            self.remaining -= frames;
            self.gain = (self.gain + self.step * frames as f32).clamp(0.0, 1.0);
        }
    }

    /// Scale an interleaved block, fading toward `target`.
    pub(crate) fn apply(&mut self, data: &mut [f32], channels: usize, target: f32) {
        // An empty block must not start a fade it cannot play.
        if data.is_empty() || channels == 0 {
            return;
        }
        self.retarget(target);

        if self.remaining == 0 {
            let gain = self.gain;
            if gain == 0.0 {
                data.fill(0.0);
            } else if gain != 1.0 {
                data.iter_mut().for_each(|sample| *sample *= gain);
            }
            return;
        }
        for frame in data.chunks_mut(channels) {
            let gain = self.next_gain();
            frame.iter_mut().for_each(|sample| *sample *= gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip_all_fields() {
        let state = VolumeState {
            group_volume: 37,
            group_muted: true,
            player_volume: 100,
            player_muted: false,
        };
        assert_eq!(VolumeState::unpack(state.pack()), state);
    }

    #[test]
    fn test_player_volume_clamps() {
        let volume = VolumeController::new(100, false);
        volume.set_player_volume(255, false);
        assert_eq!(volume.player_volume(), (100, false));
    }

    #[test]
    fn test_group_and_player_are_independent() {
        let volume = VolumeController::new(80, false);
        volume.set_group_volume(50, true);
        assert_eq!(volume.player_volume(), (80, false));
        assert_eq!(volume.group_volume(), (50, true));
        volume.reset_group();
        assert_eq!(volume.group_volume(), (100, false));
        assert_eq!(volume.player_volume(), (80, false));
    }

    #[test]
    fn test_clone_shares_state() {
        let volume = VolumeController::new(100, false);
        let handle = volume.clone();
        volume.set_player_volume(42, false);
        assert_eq!(handle.player_volume(), (42, false));
    }

    #[test]
    fn test_fade_length_ignores_channel_count() {
        // 1kHz: a 20 frame fade
        let mut mono = vec![1.0; 20];
        let mut stereo = vec![1.0; 40];
        GainRamp::new(1000, 1.0).apply(&mut mono, 1, 0.0);
        GainRamp::new(1000, 1.0).apply(&mut stereo, 2, 0.0);
        for (frame, pair) in stereo.chunks(2).enumerate() {
            assert_eq!(pair[0], pair[1]);
            assert!((pair[0] - mono[frame]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_fade_is_monotonic_and_lands_on_target() {
        let mut ramp = GainRamp::new(1000, 1.0);
        let mut data = vec![1.0; 30];
        ramp.apply(&mut data, 1, 0.5);
        assert!(data[0] < 1.0 && data[0] > 0.95);
        assert!(data[..20].windows(2).all(|w| w[1] <= w[0]));
        assert!(data[19..].iter().all(|&s| s == 0.5));
        assert_eq!(ramp.gain, 0.5);
    }

    #[test]
    fn test_empty_block_keeps_target() {
        let mut ramp = GainRamp::new(1000, 0.5);
        ramp.apply(&mut [], 1, 0.0);
        assert_eq!(ramp.target, 0.5);
        assert_eq!(ramp.remaining, 0);
    }

    #[test]
    fn test_silence_carries_the_fade() {
        let mut ramp = GainRamp::new(1000, 0.0);
        ramp.advance(10, 1.0);
        assert!((ramp.gain - 0.5).abs() < 1e-6);
        ramp.advance(10, 1.0);
        assert_eq!(ramp.gain, 1.0);
        assert_eq!(ramp.remaining, 0);
    }

    #[test]
    fn test_low_rate_snaps() {
        let mut ramp = GainRamp::new(10, 1.0);
        let mut data = vec![1.0; 4];
        ramp.apply(&mut data, 1, 0.25);
        assert!(data.iter().all(|&s| s == 0.25));
    }
}
