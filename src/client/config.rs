// ABOUTME: Client configuration built with typed-builder
// ABOUTME: Server URL, identity, device selection, buffering and initial volume

use crate::audio::DeviceSelector;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Default audio lead the ring buffer can hold.
pub const DEFAULT_BUFFER_CAPACITY_MS: u32 = 5_000;

/// Default limit for one connection attempt, handshake included.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`SendspinAudioClient`](crate::SendspinAudioClient).
///
/// ```
/// use sendspin_player::{ClientConfig, DeviceSelector};
///
/// let config = ClientConfig::builder()
///     .url("ws://localhost:8927/sendspin")
///     .client_id("kitchen-1")
///     .client_name("Kitchen")
///     .static_delay_ms(12.5)
///     .audio_device(DeviceSelector::NamePrefix("USB".into()))
///     .build();
/// assert_eq!(config.player_volume, 100);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    /// WebSocket URL of the Sendspin server
    #[builder(setter(into))]
    pub url: String,
    /// Stable identifier announced to the server
    #[builder(setter(into))]
    pub client_id: String,
    /// Display name announced to the server
    #[builder(default = "Sendspin Player".to_string(), setter(into))]
    pub client_name: String,
    /// Extra output delay in milliseconds; positive renders later
    #[builder(default = 0.0)]
    pub static_delay_ms: f64,
    /// Output device, the host default when unset
    #[builder(default, setter(strip_option))]
    pub audio_device: Option<DeviceSelector>,
    /// How much audio the ring buffer may hold
    #[builder(default = DEFAULT_BUFFER_CAPACITY_MS)]
    pub buffer_capacity_ms: u32,
    /// Limit for one connection attempt
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    pub connect_timeout: Duration,
    /// Initial local volume (0-100)
    #[builder(default = 100)]
    pub player_volume: u8,
    /// Initial local mute
    #[builder(default = false)]
    pub player_muted: bool,
}

impl ClientConfig {
    /// Ring buffer capacity in microseconds.
    pub fn buffer_capacity_us(&self) -> i64 {
        i64::from(self.buffer_capacity_ms) * 1_000
    }
}
