// ABOUTME: Boundary between the playback core and a protocol implementation
// ABOUTME: Typed inbound events, outbound commands and the Connector trait

use crate::audio::{AudioFormat, AudioFrame};
use crate::error::ConnectionError;
use crate::protocol::messages::{ControllerState, GroupUpdate, Metadata};
use crate::protocol::MediaCommand;
use crate::sync::TimelineSample;
use std::future::Future;
use std::time::Instant;
use tokio::sync::mpsc;

/// Everything the protocol side reports to the core, in arrival order.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Track metadata delta, with the local time it was received
    Metadata {
        /// Partial update
        update: Metadata,
        /// Local receive time
        received_at: Instant,
    },
    /// Group membership or playback state delta
    Group(GroupUpdate),
    /// Group controller volume, mute and command set
    ControllerState(ControllerState),
    /// Anything else worth surfacing to the user
    Event(String),
    /// A clock measurement
    TimingReference(TimelineSample),
    /// A new audio stream begins in this format
    StreamStart(AudioFormat),
    /// Buffered audio must be dropped
    StreamClear,
    /// The stream finished
    StreamEnd,
    /// Decoded audio
    Audio(AudioFrame),
    /// Session is over. `None` for an orderly close.
    Closed(Option<ConnectionError>),
}

/// Requests from the core to the protocol side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Controller media command
    Media {
        /// Command
        command: MediaCommand,
        /// Volume argument
        volume: Option<u8>,
        /// Mute argument
        mute: Option<bool>,
    },
    /// Report the local player volume
    PlayerState {
        /// Local volume (0-100)
        volume: u8,
        /// Local mute
        muted: bool,
    },
    /// Say goodbye and close
    Goodbye,
}

/// What a connector needs to open a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Server URL
    pub url: String,
    /// Stable client identifier
    pub client_id: String,
    /// Display name
    pub client_name: String,
    /// Player volume to announce
    pub player_volume: u8,
    /// Player mute to announce
    pub player_muted: bool,
    /// Audio the client can buffer, in milliseconds
    pub buffer_capacity_ms: u32,
}

/// An established session.
///
/// The session ends when `events` yields [`InboundEvent::Closed`] or closes.
/// Dropping `commands` asks the protocol side to shut down.
#[derive(Debug)]
pub struct Session {
    /// Inbound events
    pub events: mpsc::Receiver<InboundEvent>,
    /// Outbound commands
    pub commands: mpsc::Sender<OutboundCommand>,
}

impl Session {
    /// Create both ends of an in-process session. The returned pair is the
    /// protocol side's view.
    pub fn channel(buffer: usize) -> (Self, SessionPeer) {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        let (command_tx, command_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                events: event_rx,
                commands: command_tx,
            },
            SessionPeer {
                events: event_tx,
                commands: command_rx,
            },
        )
    }
}

/// The protocol side of a [`Session`].
#[derive(Debug)]
pub struct SessionPeer {
    /// Where inbound events are delivered
    pub events: mpsc::Sender<InboundEvent>,
    /// Where outbound commands arrive
    pub commands: mpsc::Receiver<OutboundCommand>,
}

/// Opens sessions with a Sendspin server.
pub trait Connector: Send + Sync + 'static {
    /// Perform one connection attempt, including the handshake.
    fn connect(
        &self,
        request: &SessionRequest,
    ) -> impl Future<Output = Result<Session, ConnectionError>> + Send;
}
