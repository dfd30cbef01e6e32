// ABOUTME: Error types for sendspin-player
// ABOUTME: Connection failures, buffer rejections, command gating and device errors

use crate::protocol::MediaCommand;
use thiserror::Error;

/// Errors produced while establishing or holding a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection attempt did not complete in time
    #[error("connection timed out")]
    Timeout,

    /// Transport-level failure (socket, WebSocket framing, remote reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The server rejected or never completed the hello exchange
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The server URL could not be used
    #[error("invalid server url: {0}")]
    InvalidUrl(String),

    /// Another `connect()` is still in flight
    #[error("a connection attempt is already in progress")]
    AlreadyConnecting,

    /// The client already holds a live session
    #[error("already connected")]
    AlreadyConnected,

    /// The session closed before the operation could complete
    #[error("session closed")]
    Closed,
}

/// Error types for sendspin-player operations
#[derive(Error, Debug)]
pub enum Error {
    /// Connection lifecycle error
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The ring buffer had no room for a frame
    #[error("audio buffer full")]
    BufferFull,

    /// The server does not advertise the command
    #[error("command not supported by server: {0}")]
    UnsupportedCommand(MediaCommand),

    /// The configured output device does not exist or cannot be used
    #[error("invalid audio device: {0}")]
    InvalidDevice(String),

    /// Protocol violation or unusable payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Audio output error
    #[error("audio output error: {0}")]
    Output(String),
}
