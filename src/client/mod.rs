// ABOUTME: Public Sendspin audio client
// ABOUTME: Connection control, state queries, local volume and media commands

/// Client configuration
pub mod config;
mod engine;
/// Subscriber events
pub mod event;
mod supervisor;

pub use config::{ClientConfig, DEFAULT_BUFFER_CAPACITY_MS, DEFAULT_CONNECT_TIMEOUT};
pub use event::{ClientEvent, ConnectionState};

use crate::audio::{AudioBackend, AudioDevice, CpalBackend};
use crate::client::engine::PlayerCore;
use crate::client::supervisor::ConnectionSupervisor;
use crate::error::{ConnectionError, Error};
use crate::protocol::{Connector, MediaCommand, OutboundCommand, WsConnector};
use crate::scheduler::TimingMetrics;
use crate::state::{GroupInfo, PlaybackState, TrackMetadata};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A synchronized Sendspin player.
///
/// Joins a server session, keeps the local output in phase with the group
/// timeline and exposes the remote state plus local controls. One session at
/// a time; reconnect policy belongs to the caller.
///
/// ```no_run
/// use sendspin_player::{ClientConfig, SendspinAudioClient};
///
/// # async fn run() -> Result<(), sendspin_player::Error> {
/// let config = ClientConfig::builder()
///     .url("ws://localhost:8927/sendspin")
///     .client_id("living-room")
///     .build();
/// let client = SendspinAudioClient::new(config)?;
/// client.connect().await?;
/// client.wait_for_disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SendspinAudioClient<C = WsConnector, B = CpalBackend> {
    config: ClientConfig,
    core: Arc<PlayerCore<B>>,
    supervisor: ConnectionSupervisor<C, B>,
}

impl SendspinAudioClient<WsConnector, CpalBackend> {
    /// Create a client that talks WebSocket and plays through cpal.
    ///
    /// Fails with [`Error::InvalidDevice`] if the configured device does not
    /// exist.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_parts(config, WsConnector::new(), CpalBackend::new())
    }
}

impl<C: Connector, B: AudioBackend> SendspinAudioClient<C, B> {
    /// Create a client over custom protocol and audio implementations.
    pub fn with_parts(config: ClientConfig, connector: C, backend: B) -> Result<Self, Error> {
        let device = backend.resolve(config.audio_device.as_ref())?;
        if let Some(device) = &device {
            log::info!("Using audio device #{} '{}'", device.index, device.name);
        }
        let core = Arc::new(PlayerCore::new(&config, backend, device));
        let supervisor = ConnectionSupervisor::new(connector, Arc::clone(&core), config.connect_timeout);
        Ok(Self {
            config,
            core,
            supervisor,
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Output device chosen at construction, `None` for the host default.
    pub fn audio_device(&self) -> Option<&AudioDevice> {
        self.core.device()
    }

    // -- Connection --

    /// Connect to the configured server.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        self.supervisor.connect(&self.config.url).await
    }

    /// Connect to `url` instead of the configured server.
    pub async fn connect_to(&self, url: &str) -> Result<(), ConnectionError> {
        self.supervisor.connect(url).await
    }

    /// Leave the session. Idempotent.
    pub async fn disconnect(&self) {
        self.supervisor.disconnect().await
    }

    /// Wait until no session is active. See [`ConnectionError`] for what
    /// an abnormal end reports.
    pub async fn wait_for_disconnect(&self) -> Result<(), ConnectionError> {
        self.supervisor.wait_for_disconnect().await
    }

    /// Whether a session is established.
    pub fn is_connected(&self) -> bool {
        self.supervisor.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Receive state changes as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.core.subscribe()
    }

    // -- Remote state --

    /// Current track metadata with interpolated progress.
    pub fn get_metadata(&self) -> TrackMetadata {
        self.core.state.metadata()
    }

    /// `(progress_ms, duration_ms)` right now.
    pub fn get_track_progress(&self) -> (Option<u64>, Option<u64>) {
        self.core.state.track_progress()
    }

    /// Group playback state.
    pub fn get_playback_state(&self) -> PlaybackState {
        self.core.state.playback_state()
    }

    /// Group membership.
    pub fn get_group_info(&self) -> GroupInfo {
        self.core.state.group_info()
    }

    /// Group volume and mute, once reported.
    pub fn get_controller_volume(&self) -> Option<(u8, bool)> {
        self.core.state.controller_volume()
    }

    /// Commands the group currently accepts.
    pub fn get_supported_commands(&self) -> Vec<MediaCommand> {
        self.core.state.supported_commands()
    }

    // -- Local player --

    /// Local volume and mute.
    pub fn get_player_volume(&self) -> (u8, bool) {
        self.core.playback.volume.player_volume()
    }

    /// Set the local volume (clamped to 0-100) and mute. Applies to this
    /// device only and is reported to the server when connected.
    pub fn set_volume(&self, volume: u8, muted: bool) {
        let volume = volume.min(100);
        self.core.playback.volume.set_player_volume(volume, muted);
        if let Some(commands) = self.supervisor.commands() {
            if let Err(e) = commands.try_send(OutboundCommand::PlayerState { volume, muted }) {
                log::debug!("Player state not reported: {}", e);
            }
        }
    }

    /// Set the static delay in milliseconds.
    pub fn set_static_delay_ms(&self, ms: f64) {
        self.core.playback.clock.set_static_delay(ms);
    }

    /// Current static delay in milliseconds.
    pub fn static_delay_ms(&self) -> f64 {
        self.core.playback.clock.static_delay_ms()
    }

    /// Playback position, buffer depth and correction counters.
    pub fn get_timing_metrics(&self) -> TimingMetrics {
        self.core.playback.timing_metrics()
    }

    // -- Group commands --

    /// Send a group media command. Refused locally, without touching the
    /// network, when the group does not advertise it.
    pub async fn send_media_command(&self, command: MediaCommand) -> Result<(), Error> {
        self.send_commands(&[(command, None, None)]).await
    }

    /// Resume playback.
    pub async fn play(&self) -> Result<(), Error> {
        self.send_media_command(MediaCommand::Play).await
    }

    /// Pause playback.
    pub async fn pause(&self) -> Result<(), Error> {
        self.send_media_command(MediaCommand::Pause).await
    }

    /// Pause when playing, play otherwise.
    pub async fn toggle_play_pause(&self) -> Result<(), Error> {
        match self.get_playback_state() {
            PlaybackState::Playing => self.pause().await,
            _ => self.play().await,
        }
    }

    /// Skip to the next track.
    pub async fn next_track(&self) -> Result<(), Error> {
        self.send_media_command(MediaCommand::Next).await
    }

    /// Go back to the previous track.
    pub async fn previous_track(&self) -> Result<(), Error> {
        self.send_media_command(MediaCommand::Previous).await
    }

    /// Move this player to the next group.
    pub async fn switch_group(&self) -> Result<(), Error> {
        self.send_media_command(MediaCommand::Switch).await
    }

    /// Ask the controller to change the group volume and mute.
    pub async fn set_group_volume(&self, volume: u8, muted: bool) -> Result<(), Error> {
        self.send_commands(&[
            (MediaCommand::Volume, Some(volume.min(100)), None),
            (MediaCommand::Mute, None, Some(muted)),
        ])
        .await
    }

    async fn send_commands(
        &self,
        batch: &[(MediaCommand, Option<u8>, Option<bool>)],
    ) -> Result<(), Error> {
        if let Some((command, _, _)) = batch
            .iter()
            .find(|(command, _, _)| !self.core.state.supports(*command))
        {
            return Err(Error::UnsupportedCommand(*command));
        }
        let commands = self.supervisor.commands().ok_or(ConnectionError::Closed)?;
        for &(command, volume, mute) in batch {
            log::debug!("Sending command: {}", command);
            commands
                .send(OutboundCommand::Media {
                    command,
                    volume,
                    mute,
                })
                .await
                .map_err(|_| ConnectionError::Closed)?;
        }
        Ok(())
    }

    /// Multi-line diagnostic summary.
    pub fn describe_state(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Connection: {}", self.connection_state());
        let _ = writeln!(out, "Server: {}", self.config.url);
        out.push_str(&self.core.state.describe_state());
        let (volume, muted) = self.get_player_volume();
        let _ = writeln!(
            out,
            "Player volume: {}%{}",
            volume,
            if muted { " (muted)" } else { "" }
        );
        let metrics = self.get_timing_metrics();
        match metrics.playback_position_us {
            Some(position) => {
                let _ = writeln!(out, "Position: {:.3}s", position as f64 / 1e6);
            }
            None => {
                let _ = writeln!(out, "Position: -");
            }
        }
        let _ = writeln!(
            out,
            "Buffered: {:.1}ms, underruns: {}, drift corrections: {}, resyncs: {}",
            metrics.buffered_audio_us as f64 / 1000.0,
            metrics.underruns,
            metrics.drift_corrections,
            metrics.resyncs
        );
        let _ = writeln!(out, "Static delay: {:.1}ms", metrics.static_delay_ms);
        let _ = writeln!(
            out,
            "Audio output: {}",
            if self.core.output_open() { "open" } else { "closed" }
        );
        out
    }
}
