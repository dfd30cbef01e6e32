// ABOUTME: Events published to client subscribers
// ABOUTME: State changes, generic messages and connection transitions

use crate::state::{GroupInfo, TrackMetadata};
use std::fmt;

/// Lifecycle of the client's single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// A connection attempt is in flight
    Connecting,
    /// Session established; audio may play
    Connected,
    /// Session is being torn down
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Published through [`SendspinAudioClient::subscribe`](crate::SendspinAudioClient::subscribe).
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Track metadata changed
    MetadataUpdated(TrackMetadata),
    /// Group membership or playback state changed
    GroupUpdated(GroupInfo),
    /// Group volume or mute changed
    ControllerStateUpdated {
        /// Group volume (0-100)
        volume: u8,
        /// Group mute
        muted: bool,
    },
    /// Human readable notice
    Event(String),
    /// Session state changed
    ConnectionStateChanged(ConnectionState),
}
