// ABOUTME: Sendspin synchronized audio player library
// ABOUTME: Joins a Sendspin group and plays its audio in phase with the other players

//! Synchronized Sendspin player core.
//!
//! A [`SendspinAudioClient`] joins one Sendspin server session, maps the
//! server timeline onto the local monotonic clock, buffers timestamped audio
//! and renders it through the output device with small drift corrections so
//! that every player in the group stays in phase.
//!
//! The crate is split along its seams:
//!
//! - [`sync`]: server timeline to local clock mapping
//! - [`audio`]: frames, decoding, the jitter ring buffer, gain and output devices
//! - [`scheduler`]: the callback-side playback scheduler
//! - [`protocol`]: wire messages and the session boundary
//! - [`state`]: metadata, group and controller snapshot
//! - [`client`]: the public client and its connection lifecycle
//! - [`discovery`]: finding servers on the network

#![warn(missing_docs)]

/// Audio types, buffering, gain and output
pub mod audio;
/// Public client API
pub mod client;
/// Server discovery
pub mod discovery;
/// Error types
pub mod error;
/// Sendspin protocol
pub mod protocol;
/// Playback scheduling
pub mod scheduler;
/// Remote state tracking
pub mod state;
/// Clock synchronization
pub mod sync;

pub use audio::{AudioDevice, DeviceSelector};
pub use client::{ClientConfig, ClientEvent, ConnectionState, SendspinAudioClient};
pub use discovery::{DiscoveredServer, Discovery, ServerRegistry};
pub use error::{ConnectionError, Error};
pub use protocol::MediaCommand;
pub use scheduler::TimingMetrics;
pub use state::{GroupInfo, PlaybackState, TrackMetadata};

/// Result type for Sendspin operations
pub type Result<T> = std::result::Result<T, Error>;
