// ABOUTME: Protocol implementation for the Sendspin WebSocket protocol
// ABOUTME: Wire messages, the session boundary and the WebSocket connector

/// WebSocket connector
pub mod client;
/// Media command set
pub mod command;
/// Protocol message type definitions and serialization
pub mod messages;
/// Session boundary between the core and a protocol implementation
pub mod session;

pub use client::WsConnector;
pub use command::{MediaCommand, UnknownCommand};
pub use messages::Message;
pub use session::{Connector, InboundEvent, OutboundCommand, Session, SessionPeer, SessionRequest};
