// ABOUTME: Coherent snapshot of remote session state built from inbound events
// ABOUTME: Track metadata, group, controller state and time-interpolated track progress

use crate::protocol::messages::{
    ControllerState, GroupPlaybackState, GroupUpdate, Metadata, RepeatMode,
};
use crate::protocol::MediaCommand;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::time::Instant;

/// Group playback state as last reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Nothing reported yet
    #[default]
    Idle,
    /// Playing
    Playing,
    /// Paused
    Paused,
    /// Stopped
    Stopped,
}

impl PlaybackState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GroupPlaybackState> for PlaybackState {
    fn from(state: GroupPlaybackState) -> Self {
        match state {
            GroupPlaybackState::Playing => PlaybackState::Playing,
            GroupPlaybackState::Paused => PlaybackState::Paused,
            GroupPlaybackState::Stopped => PlaybackState::Stopped,
        }
    }
}

/// Current track description with progress evaluated at read time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackMetadata {
    /// Title
    pub title: Option<String>,
    /// Artist
    pub artist: Option<String>,
    /// Album
    pub album: Option<String>,
    /// Release year
    pub year: Option<u32>,
    /// Track number
    pub track: Option<u32>,
    /// Repeat mode
    pub repeat: Option<RepeatMode>,
    /// Shuffle flag
    pub shuffle: Option<bool>,
    /// Interpolated position in ms
    pub track_progress_ms: Option<u64>,
    /// Track length in ms
    pub track_duration_ms: Option<u64>,
}

/// Group membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupInfo {
    /// Group identifier
    pub group_id: Option<String>,
    /// Group display name
    pub group_name: Option<String>,
    /// Group playback state, if reported
    pub playback_state: Option<PlaybackState>,
}

#[derive(Debug, Clone)]
struct ProgressSnapshot {
    progress_ms: Option<u64>,
    duration_ms: Option<u64>,
    speed: u32,
    captured_at: Instant,
}

impl ProgressSnapshot {
    fn new(now: Instant) -> Self {
        Self {
            progress_ms: None,
            duration_ms: None,
            speed: 1000,
            captured_at: now,
        }
    }

    fn at(&self, now: Instant, playing: bool) -> Option<u64> {
        let base = self.progress_ms?;
        if !playing || self.speed == 0 {
            return Some(base);
        }
        let elapsed_ms = now.saturating_duration_since(self.captured_at).as_millis() as u64;
        let advanced = base.saturating_add(elapsed_ms.saturating_mul(u64::from(self.speed)) / 1000);
        Some(match self.duration_ms {
            Some(duration) => advanced.min(duration),
            None => advanced,
        })
    }
}

#[derive(Debug, Clone)]
struct AggregatedState {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    year: Option<u32>,
    track: Option<u32>,
    repeat: Option<RepeatMode>,
    shuffle: Option<bool>,
    progress: ProgressSnapshot,
    playback_state: PlaybackState,
    group: GroupInfo,
    controller: Option<(u8, bool)>,
    supported_commands: BTreeSet<MediaCommand>,
    last_event: Option<String>,
}

impl AggregatedState {
    fn new(now: Instant) -> Self {
        Self {
            title: None,
            artist: None,
            album: None,
            year: None,
            track: None,
            repeat: None,
            shuffle: None,
            progress: ProgressSnapshot::new(now),
            playback_state: PlaybackState::Idle,
            group: GroupInfo::default(),
            controller: None,
            supported_commands: BTreeSet::new(),
            last_event: None,
        }
    }

    fn is_playing(&self) -> bool {
        self.playback_state == PlaybackState::Playing
    }

    fn set_playback_state(&mut self, next: PlaybackState, now: Instant) {
        if next == self.playback_state {
            return;
        }
        if self.is_playing() {
            // Freeze before the clock stops counting.
            self.progress.progress_ms = self.progress.at(now, true);
        }
        self.progress.captured_at = now;
        self.playback_state = next;
    }
}

/// Applies a partial update: absent leaves the value, null clears it.
fn merge<T>(slot: &mut Option<T>, update: &Option<Option<T>>)
where
    T: Clone,
{
    if let Some(value) = update {
        *slot = value.clone();
    }
}

/// Maintains the remote-state snapshot. Written by the event task, read by
/// anyone; every read sees a consistent state.
#[derive(Debug)]
pub struct StateAggregator {
    inner: Mutex<AggregatedState>,
}

impl StateAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AggregatedState::new(Instant::now())),
        }
    }

    /// Apply a metadata delta received at `received_at`.
    pub fn apply_metadata(&self, update: &Metadata, received_at: Instant) {
        let mut state = self.inner.lock();
        merge(&mut state.title, &update.title);
        merge(&mut state.artist, &update.artist);
        merge(&mut state.album, &update.album);
        merge(&mut state.year, &update.year);
        merge(&mut state.track, &update.track);
        merge(&mut state.repeat, &update.repeat);
        merge(&mut state.shuffle, &update.shuffle);

        match &update.progress {
            Some(Some(progress)) => {
                state.progress = ProgressSnapshot {
                    progress_ms: Some(progress.track_progress),
                    duration_ms: (progress.track_duration > 0).then_some(progress.track_duration),
                    speed: progress.playback_speed,
                    captured_at: received_at,
                };
            }
            Some(None) => state.progress = ProgressSnapshot::new(received_at),
            None => {}
        }
    }

    /// Apply a group delta observed at `now`.
    pub fn apply_group(&self, update: &GroupUpdate, now: Instant) {
        let mut state = self.inner.lock();
        merge(&mut state.group.group_id, &update.group_id);
        merge(&mut state.group.group_name, &update.group_name);
        if let Some(playback_state) = &update.playback_state {
            let next = playback_state.map(PlaybackState::from);
            state.group.playback_state = next;
            state.set_playback_state(next.unwrap_or(PlaybackState::Idle), now);
        }
    }

    /// Apply the group controller state.
    ///
    /// Returns the supported command names that were not recognised.
    pub fn apply_controller(&self, controller: &ControllerState) -> Vec<String> {
        let mut unknown = Vec::new();
        let commands = controller
            .supported_commands
            .iter()
            .filter_map(|name| match name.parse::<MediaCommand>() {
                Ok(command) => Some(command),
                Err(_) => {
                    unknown.push(name.clone());
                    None
                }
            })
            .collect();
        let mut state = self.inner.lock();
        state.controller = Some((controller.volume.min(100), controller.muted));
        state.supported_commands = commands;
        unknown
    }

    /// Remember the latest generic event.
    pub fn record_event(&self, message: impl Into<String>) {
        self.inner.lock().last_event = Some(message.into());
    }

    /// Track metadata with progress interpolated to now.
    pub fn metadata(&self) -> TrackMetadata {
        self.metadata_at(Instant::now())
    }

    /// Track metadata with progress interpolated to `now`.
    pub fn metadata_at(&self, now: Instant) -> TrackMetadata {
        let state = self.inner.lock();
        TrackMetadata {
            title: state.title.clone(),
            artist: state.artist.clone(),
            album: state.album.clone(),
            year: state.year,
            track: state.track,
            repeat: state.repeat,
            shuffle: state.shuffle,
            track_progress_ms: state.progress.at(now, state.is_playing()),
            track_duration_ms: state.progress.duration_ms,
        }
    }

    /// `(progress_ms, duration_ms)` as of now.
    pub fn track_progress(&self) -> (Option<u64>, Option<u64>) {
        self.track_progress_at(Instant::now())
    }

    /// `(progress_ms, duration_ms)` as of `now`. Advances only while
    /// playing and never passes the duration.
    pub fn track_progress_at(&self, now: Instant) -> (Option<u64>, Option<u64>) {
        let state = self.inner.lock();
        (
            state.progress.at(now, state.is_playing()),
            state.progress.duration_ms,
        )
    }

    /// Current playback state.
    pub fn playback_state(&self) -> PlaybackState {
        self.inner.lock().playback_state
    }

    /// Group membership.
    pub fn group_info(&self) -> GroupInfo {
        self.inner.lock().group.clone()
    }

    /// Group volume and mute, once the controller has reported them.
    pub fn controller_volume(&self) -> Option<(u8, bool)> {
        self.inner.lock().controller
    }

    /// Commands the group accepts, sorted.
    pub fn supported_commands(&self) -> Vec<MediaCommand> {
        self.inner.lock().supported_commands.iter().copied().collect()
    }

    /// Whether `command` is currently accepted.
    pub fn supports(&self, command: MediaCommand) -> bool {
        self.inner.lock().supported_commands.contains(&command)
    }

    /// Most recent generic event.
    pub fn last_event(&self) -> Option<String> {
        self.inner.lock().last_event.clone()
    }

    /// Forget everything, as after a reconnect.
    pub fn reset(&self) {
        *self.inner.lock() = AggregatedState::new(Instant::now());
    }

    /// Multi-line human readable dump.
    pub fn describe_state(&self) -> String {
        let now = Instant::now();
        let state = self.inner.lock();
        let mut out = String::new();
        let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

        let _ = writeln!(out, "Playback: {}", state.playback_state);
        let _ = writeln!(
            out,
            "Track: {} / {} / {}",
            or_dash(&state.title),
            or_dash(&state.artist),
            or_dash(&state.album)
        );
        if let Some(year) = state.year {
            let _ = writeln!(out, "Year: {}", year);
        }
        if let Some(track) = state.track {
            let _ = writeln!(out, "Track number: {}", track);
        }
        match (state.progress.at(now, state.is_playing()), state.progress.duration_ms) {
            (Some(progress), Some(duration)) => {
                let _ = writeln!(
                    out,
                    "Progress: {:.1}s / {:.1}s",
                    progress as f64 / 1000.0,
                    duration as f64 / 1000.0
                );
            }
            (Some(progress), None) => {
                let _ = writeln!(out, "Progress: {:.1}s", progress as f64 / 1000.0);
            }
            _ => {}
        }
        if let Some(repeat) = state.repeat {
            let _ = writeln!(out, "Repeat: {:?}", repeat);
        }
        if let Some(shuffle) = state.shuffle {
            let _ = writeln!(out, "Shuffle: {}", shuffle);
        }
        let _ = writeln!(
            out,
            "Group: {} ({})",
            or_dash(&state.group.group_id),
            or_dash(&state.group.group_name)
        );
        match state.controller {
            Some((volume, muted)) => {
                let _ = writeln!(
                    out,
                    "Group volume: {}%{}",
                    volume,
                    if muted { " (muted)" } else { "" }
                );
            }
            None => {
                let _ = writeln!(out, "Group volume: -");
            }
        }
        let commands: Vec<&str> = state.supported_commands.iter().map(|c| c.as_str()).collect();
        let _ = writeln!(out, "Supported commands: {}", commands.join(", "));
        if let Some(event) = &state.last_event {
            let _ = writeln!(out, "Last event: {}", event);
        }
        out
    }
}

impl Default for StateAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::Progress;
    use std::time::Duration;

    fn playing() -> GroupUpdate {
        GroupUpdate {
            playback_state: Some(Some(GroupPlaybackState::Playing)),
            ..GroupUpdate::default()
        }
    }

    #[test]
    fn test_absent_fields_are_kept_and_null_clears() {
        let aggregator = StateAggregator::new();
        let now = Instant::now();
        aggregator.apply_metadata(
            &Metadata {
                title: Some(Some("One".into())),
                artist: Some(Some("Band".into())),
                ..Metadata::default()
            },
            now,
        );
        aggregator.apply_metadata(
            &Metadata {
                artist: Some(None),
                ..Metadata::default()
            },
            now,
        );
        let metadata = aggregator.metadata_at(now);
        assert_eq!(metadata.title.as_deref(), Some("One"));
        assert_eq!(metadata.artist, None);
    }

    #[test]
    fn test_playback_speed_scales_interpolation() {
        let aggregator = StateAggregator::new();
        let t0 = Instant::now();
        aggregator.apply_group(&playing(), t0);
        aggregator.apply_metadata(
            &Metadata {
                progress: Some(Some(Progress {
                    track_progress: 0,
                    track_duration: 60_000,
                    playback_speed: 2000,
                })),
                ..Metadata::default()
            },
            t0,
        );
        let (progress, _) = aggregator.track_progress_at(t0 + Duration::from_secs(1));
        assert_eq!(progress, Some(2_000));
    }

    #[test]
    fn test_unknown_commands_are_reported() {
        let aggregator = StateAggregator::new();
        let unknown = aggregator.apply_controller(&ControllerState {
            supported_commands: vec!["play".into(), "teleport".into()],
            volume: 30,
            muted: true,
        });
        assert_eq!(unknown, vec!["teleport".to_string()]);
        assert!(aggregator.supports(MediaCommand::Play));
        assert_eq!(aggregator.controller_volume(), Some((30, true)));
    }

    #[test]
    fn test_describe_state_mentions_track() {
        let aggregator = StateAggregator::new();
        aggregator.apply_metadata(
            &Metadata {
                title: Some(Some("Song".into())),
                ..Metadata::default()
            },
            Instant::now(),
        );
        let description = aggregator.describe_state();
        assert!(description.contains("Playback: idle"));
        assert!(description.contains("Song"));
    }
}
