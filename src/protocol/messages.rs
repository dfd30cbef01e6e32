// ABOUTME: Sendspin wire message definitions
// ABOUTME: JSON envelopes ({"type", "payload"}) and the binary audio chunk header

use crate::error::Error;
use crate::protocol::MediaCommand;
use serde::{Deserialize, Deserializer, Serialize};

/// Binary message type byte for player audio chunks.
pub const PLAYER_AUDIO_CHUNK: u8 = 4;

/// Binary header: type byte plus big-endian server timestamp in µs.
pub const AUDIO_CHUNK_HEADER_LEN: usize = 9;

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in partial state updates.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Top-level protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client handshake
    #[serde(rename = "client/hello")]
    ClientHello(ClientHello),
    /// Server handshake reply
    #[serde(rename = "server/hello")]
    ServerHello(ServerHello),
    /// Clock sync request from the client
    #[serde(rename = "client/time")]
    ClientTime(ClientTime),
    /// Clock sync reply
    #[serde(rename = "server/time")]
    ServerTime(ServerTime),
    /// Player state report
    #[serde(rename = "client/state")]
    ClientState(ClientState),
    /// Metadata and controller state from the server
    #[serde(rename = "server/state")]
    ServerState(ServerState),
    /// Controller command from the client
    #[serde(rename = "client/command")]
    ClientCommand(ClientCommand),
    /// Player command from the server
    #[serde(rename = "server/command")]
    ServerCommand(ServerCommand),
    /// Stream format announcement
    #[serde(rename = "stream/start")]
    StreamStart(StreamStart),
    /// Drop buffered audio
    #[serde(rename = "stream/clear")]
    StreamClear(StreamClear),
    /// Stream finished
    #[serde(rename = "stream/end")]
    StreamEnd(StreamEnd),
    /// Group membership and playback state
    #[serde(rename = "group/update")]
    GroupUpdate(GroupUpdate),
    /// Client is leaving
    #[serde(rename = "client/goodbye")]
    ClientGoodbye(ClientGoodbye),
}

/// client/hello payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHello {
    /// Stable client identifier
    pub client_id: String,
    /// Display name
    pub name: String,
    /// Protocol version
    pub version: u32,
    /// Roles such as `player@v1`
    pub supported_roles: Vec<String>,
    /// Device description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
    /// Player capabilities
    #[serde(rename = "player@v1_support", skip_serializing_if = "Option::is_none")]
    pub player_v1_support: Option<PlayerV1Support>,
}

/// Device description sent in the hello
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Product name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Manufacturer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Software version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub software_version: Option<String>,
}

/// Player role capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerV1Support {
    /// Formats the player can render
    pub supported_formats: Vec<AudioFormatSpec>,
    /// Buffer size in bytes
    pub buffer_capacity: u32,
    /// Server commands the player honours
    pub supported_commands: Vec<String>,
}

/// One supported stream format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormatSpec {
    /// Codec name (`pcm`)
    pub codec: String,
    /// Channel count
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bit_depth: u8,
}

/// server/hello payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerHello {
    /// Server identifier
    pub server_id: String,
    /// Server display name
    pub name: String,
    /// Protocol version
    pub version: u32,
    /// Roles the server activated for this client
    #[serde(default)]
    pub active_roles: Vec<String>,
    /// Why the server accepted the connection
    #[serde(default)]
    pub connection_reason: Option<ConnectionReason>,
}

/// Reason given in server/hello
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionReason {
    /// Server found the client through discovery
    Discovery,
    /// Server wants the client for playback
    Playback,
}

/// client/time payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientTime {
    /// Local monotonic send time in µs
    pub client_transmitted: i64,
}

/// server/time payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerTime {
    /// Echo of the client's send time
    pub client_transmitted: i64,
    /// Server receive time in µs
    pub server_received: i64,
    /// Server send time in µs
    pub server_transmitted: i64,
}

/// client/state payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientState {
    /// Player role state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerState>,
}

/// Player role state report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerState {
    /// Sync state
    pub state: PlayerSyncState,
    /// Local volume (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    /// Local mute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

/// Player sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerSyncState {
    /// Playing in sync
    Synchronized,
    /// Unable to play
    Error,
}

/// server/state payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerState {
    /// Track metadata delta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Group controller state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerState>,
}

/// Track metadata delta. `None` leaves a field unchanged, `Some(None)`
/// clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Server time (µs) at which `progress` was sampled
    #[serde(default)]
    pub timestamp: i64,
    /// Track title
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    /// Track artist
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub artist: Option<Option<String>>,
    /// Album name
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub album: Option<Option<String>>,
    /// Release year
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub year: Option<Option<u32>>,
    /// Track number
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub track: Option<Option<u32>>,
    /// Playback position
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub progress: Option<Option<Progress>>,
    /// Repeat mode
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub repeat: Option<Option<RepeatMode>>,
    /// Shuffle flag
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<Option<bool>>,
}

/// Track position at `Metadata::timestamp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Position in ms
    pub track_progress: u64,
    /// Track length in ms (0 when unknown)
    pub track_duration: u64,
    /// Speed in thousandths (1000 = normal)
    #[serde(default = "default_playback_speed")]
    pub playback_speed: u32,
}

fn default_playback_speed() -> u32 {
    1000
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// No repeat
    Off,
    /// Repeat the current track
    One,
    /// Repeat the queue
    All,
}

/// Group controller state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerState {
    /// Commands the group accepts
    #[serde(default)]
    pub supported_commands: Vec<String>,
    /// Group volume (0-100)
    pub volume: u8,
    /// Group mute
    pub muted: bool,
}

/// client/command payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCommand {
    /// Controller command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerCommand>,
}

/// A command for the group controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerCommand {
    /// Command name
    pub command: MediaCommand,
    /// Target volume for `volume`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    /// Target mute for `mute`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mute: Option<bool>,
}

/// server/command payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCommand {
    /// Player command
    #[serde(default)]
    pub player: Option<PlayerCommand>,
}

/// A command addressed to this player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerCommand {
    /// Command name
    pub command: String,
    /// Requested volume
    #[serde(default)]
    pub volume: Option<u8>,
    /// Requested mute
    #[serde(default)]
    pub mute: Option<bool>,
}

/// stream/start payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStart {
    /// Player stream format
    #[serde(default)]
    pub player: Option<StreamPlayerConfig>,
}

/// Player stream format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamPlayerConfig {
    /// Codec name
    pub codec: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u8,
    /// Bits per sample
    pub bit_depth: u8,
}

/// stream/clear payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamClear {
    /// Affected roles, all when absent
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// stream/end payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamEnd {
    /// Affected roles, all when absent
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// group/update payload. Same absent/null convention as [`Metadata`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupUpdate {
    /// Group playback state
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub playback_state: Option<Option<GroupPlaybackState>>,
    /// Group identifier
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Option<String>>,
    /// Group display name
    #[serde(default, deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub group_name: Option<Option<String>>,
}

/// Playback state reported for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupPlaybackState {
    /// Playing
    Playing,
    /// Paused
    Paused,
    /// Stopped
    Stopped,
}

/// client/goodbye payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientGoodbye {
    /// Why the client is leaving
    pub reason: GoodbyeReason,
}

/// Goodbye reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoodbyeReason {
    /// Switching to another server
    AnotherServer,
    /// Process shutting down
    Shutdown,
    /// Process restarting
    Restart,
    /// The user asked to disconnect
    UserRequest,
}

/// A parsed binary audio message, borrowing its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioChunk<'a> {
    /// Message type byte
    pub kind: u8,
    /// Server time (µs) at which the first sample plays
    pub timestamp_us: i64,
    /// Encoded audio
    pub data: &'a [u8],
}

impl<'a> AudioChunk<'a> {
    /// Split a binary message into header and payload.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, Error> {
        if bytes.len() < AUDIO_CHUNK_HEADER_LEN {
            return Err(Error::Protocol(format!(
                "binary message too short: {} bytes",
                bytes.len()
            )));
        }
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&bytes[1..AUDIO_CHUNK_HEADER_LEN]);
        Ok(Self {
            kind: bytes[0],
            timestamp_us: i64::from_be_bytes(timestamp),
            data: &bytes[AUDIO_CHUNK_HEADER_LEN..],
        })
    }

    /// True for player audio.
    pub fn is_player_audio(&self) -> bool {
        self.kind == PLAYER_AUDIO_CHUNK
    }
}
