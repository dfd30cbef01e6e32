// ABOUTME: WebSocket implementation of the Connector boundary
// ABOUTME: Handshake, clock sync, message translation and PCM chunk decoding

use crate::audio::decode::{Decoder, PcmDecoder};
use crate::audio::{AudioFormat, AudioFrame};
use crate::error::{ConnectionError, Error};
use crate::protocol::messages::{
    AudioChunk, AudioFormatSpec, ClientCommand, ClientGoodbye, ClientHello, ClientState,
    ClientTime, ControllerCommand, DeviceInfo, GoodbyeReason, Message, PlayerState,
    PlayerSyncState, PlayerV1Support, ServerHello, ServerTime,
};
use crate::protocol::session::{
    Connector, InboundEvent, OutboundCommand, Session, SessionPeer, SessionRequest,
};
use crate::sync::{instant_to_monotonic_us, monotonic_us, TimelineSample};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How often a clock sync request is sent.
pub const TIME_SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Clock sync replies slower than this round trip are discarded.
pub const MAX_TIME_SYNC_RTT_US: i64 = 100_000;

const EVENT_CHANNEL_DEPTH: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Opens Sendspin sessions over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    time_sync_interval: Duration,
}

impl WsConnector {
    /// Connector with the default clock sync interval.
    pub fn new() -> Self {
        Self {
            time_sync_interval: TIME_SYNC_INTERVAL,
        }
    }

    /// Override the clock sync interval.
    pub fn with_time_sync_interval(mut self, interval: Duration) -> Self {
        self.time_sync_interval = interval.max(Duration::from_millis(100));
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WsConnector {
    async fn connect(&self, request: &SessionRequest) -> Result<Session, ConnectionError> {
        if !(request.url.starts_with("ws://") || request.url.starts_with("wss://")) {
            return Err(ConnectionError::InvalidUrl(request.url.clone()));
        }

        let (ws, _) = connect_async(request.url.as_str())
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        let (mut sink, mut source) = ws.split();

        send_message(&mut sink, &Message::ClientHello(client_hello(request))).await?;
        let server = await_server_hello(&mut source).await?;
        log::info!(
            "Connected to server '{}' ({}), roles: {:?}",
            server.name,
            server.server_id,
            server.active_roles
        );

        let state = Message::ClientState(ClientState {
            player: Some(PlayerState {
                state: PlayerSyncState::Synchronized,
                volume: Some(request.player_volume),
                muted: Some(request.player_muted),
            }),
        });
        send_message(&mut sink, &state).await?;

        let (session, peer) = Session::channel(EVENT_CHANNEL_DEPTH);
        tokio::spawn(run_session(sink, source, peer, self.time_sync_interval));
        Ok(session)
    }
}

fn client_hello(request: &SessionRequest) -> ClientHello {
    let supported_formats = [48_000, 44_100]
        .into_iter()
        .flat_map(|sample_rate| {
            [24, 16].into_iter().map(move |bit_depth| AudioFormatSpec {
                codec: "pcm".to_string(),
                channels: 2,
                sample_rate,
                bit_depth,
            })
        })
        .collect();
    // Worst case: 48kHz stereo 24-bit.
    let buffer_capacity = u32::try_from(u64::from(request.buffer_capacity_ms) * 48 * 2 * 3)
        .unwrap_or(u32::MAX);

    ClientHello {
        client_id: request.client_id.clone(),
        name: request.client_name.clone(),
        version: 1,
        supported_roles: vec![
            "player@v1".to_string(),
            "controller@v1".to_string(),
            "metadata@v1".to_string(),
        ],
        device_info: Some(DeviceInfo {
            product_name: Some("sendspin-player".to_string()),
            manufacturer: Some("Sendspin".to_string()),
            software_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }),
        player_v1_support: Some(PlayerV1Support {
            supported_formats,
            buffer_capacity,
            supported_commands: vec!["volume".to_string(), "mute".to_string()],
        }),
    }
}

async fn await_server_hello(source: &mut WsSource) -> Result<ServerHello, ConnectionError> {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return match serde_json::from_str::<Message>(&text) {
                    Ok(Message::ServerHello(hello)) => Ok(hello),
                    Ok(other) => Err(ConnectionError::Handshake(format!(
                        "expected server/hello, got {:?}",
                        other
                    ))),
                    Err(e) => Err(ConnectionError::Handshake(e.to_string())),
                };
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close(_))) | None => {
                return Err(ConnectionError::Handshake(
                    "server closed the connection during handshake".to_string(),
                ))
            }
            Some(Ok(_)) => {
                return Err(ConnectionError::Handshake(
                    "unexpected binary message before server/hello".to_string(),
                ))
            }
            Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
        }
    }
}

async fn send_message(sink: &mut WsSink, message: &Message) -> Result<(), ConnectionError> {
    let text =
        serde_json::to_string(message).map_err(|e| ConnectionError::Transport(e.to_string()))?;
    sink.send(WsMessage::Text(text))
        .await
        .map_err(|e| ConnectionError::Transport(e.to_string()))
}

async fn deliver(events: &tokio::sync::mpsc::Sender<InboundEvent>, batch: Vec<InboundEvent>) -> bool {
    for event in batch {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

async fn run_session(mut sink: WsSink, mut source: WsSource, peer: SessionPeer, interval: Duration) {
    let SessionPeer {
        events,
        mut commands,
    } = peer;
    let mut translator = Translator::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    let received_at = Instant::now();
                    match serde_json::from_str::<Message>(&text) {
                        Ok(message) => {
                            let batch = translator.on_message(message, received_at);
                            if !deliver(&events, batch).await {
                                break None;
                            }
                        }
                        Err(e) => log::warn!("Ignoring unparseable message: {}", e),
                    }
                }
                Some(Ok(WsMessage::Binary(bytes))) => match translator.on_binary(&bytes) {
                    Ok(Some(event)) => {
                        if events.send(event).await.is_err() {
                            break None;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Dropping audio chunk: {}", e),
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    log::info!("Server closed the session: {:?}", frame);
                    break None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(ConnectionError::Transport(e.to_string())),
                None => break Some(ConnectionError::Closed),
            },
            command = commands.recv() => match command {
                Some(OutboundCommand::Goodbye) | None => {
                    let goodbye = Message::ClientGoodbye(ClientGoodbye {
                        reason: GoodbyeReason::UserRequest,
                    });
                    if let Err(e) = send_message(&mut sink, &goodbye).await {
                        log::debug!("Goodbye not delivered: {}", e);
                    }
                    let _ = sink.close().await;
                    break None;
                }
                Some(command) => {
                    if let Err(e) = send_message(&mut sink, &outbound_message(command)).await {
                        break Some(e);
                    }
                }
            },
            _ = ticker.tick() => {
                let request = Message::ClientTime(ClientTime {
                    client_transmitted: monotonic_us(),
                });
                if let Err(e) = send_message(&mut sink, &request).await {
                    break Some(e);
                }
            }
        }
    };

    if let Some(ref error) = outcome {
        log::warn!("Session ended: {}", error);
    }
    let _ = events.send(InboundEvent::Closed(outcome)).await;
}

fn outbound_message(command: OutboundCommand) -> Message {
    match command {
        OutboundCommand::Media {
            command,
            volume,
            mute,
        } => Message::ClientCommand(ClientCommand {
            controller: Some(ControllerCommand {
                command,
                volume,
                mute,
            }),
        }),
        OutboundCommand::PlayerState { volume, muted } => Message::ClientState(ClientState {
            player: Some(PlayerState {
                state: PlayerSyncState::Synchronized,
                volume: Some(volume),
                muted: Some(muted),
            }),
        }),
        OutboundCommand::Goodbye => Message::ClientGoodbye(ClientGoodbye {
            reason: GoodbyeReason::UserRequest,
        }),
    }
}

/// Turn a server/time reply received at local time `received_us` into a
/// timeline sample, pairing the server midpoint with the local midpoint.
/// Returns `None` when the round trip is too slow to trust.
pub fn time_sample(reply: &ServerTime, received_us: i64) -> Option<TimelineSample> {
    let server_hold = reply.server_transmitted - reply.server_received;
    let rtt = (received_us - reply.client_transmitted) - server_hold;
    if !(0..=MAX_TIME_SYNC_RTT_US).contains(&rtt) {
        log::debug!("Discarding clock sync reply with rtt {}us", rtt);
        return None;
    }
    Some(TimelineSample {
        server_timestamp_us: reply.server_received + server_hold / 2,
        local_monotonic_us: reply.client_transmitted + (received_us - reply.client_transmitted) / 2,
    })
}

fn targets_player(roles: &Option<Vec<String>>) -> bool {
    roles
        .as_ref()
        .map_or(true, |roles| roles.iter().any(|role| role.starts_with("player")))
}

/// Per-session message translation state.
#[derive(Default)]
pub(crate) struct Translator {
    stream: Option<(AudioFormat, PcmDecoder)>,
}

impl Translator {
    pub(crate) fn on_message(&mut self, message: Message, received_at: Instant) -> Vec<InboundEvent> {
        let mut batch = Vec::new();
        match message {
            Message::ServerTime(reply) => {
                if let Some(sample) = time_sample(&reply, instant_to_monotonic_us(received_at)) {
                    batch.push(InboundEvent::TimingReference(sample));
                }
            }
            Message::ServerState(state) => {
                if let Some(update) = state.metadata {
                    batch.push(InboundEvent::Metadata {
                        update,
                        received_at,
                    });
                }
                if let Some(controller) = state.controller {
                    batch.push(InboundEvent::ControllerState(controller));
                }
            }
            Message::GroupUpdate(update) => batch.push(InboundEvent::Group(update)),
            Message::StreamStart(start) => {
                let Some(player) = start.player else {
                    return batch;
                };
                if player.codec != "pcm" {
                    self.stream = None;
                    batch.push(InboundEvent::Event(format!(
                        "Unsupported codec '{}', stream ignored",
                        player.codec
                    )));
                    return batch;
                }
                let format = AudioFormat {
                    sample_rate: player.sample_rate,
                    channels: player.channels,
                    bit_depth: player.bit_depth,
                };
                match PcmDecoder::for_format(&format) {
                    Ok(decoder) => {
                        self.stream = Some((format, decoder));
                        batch.push(InboundEvent::StreamStart(format));
                    }
                    Err(e) => {
                        self.stream = None;
                        batch.push(InboundEvent::Event(format!("Stream rejected: {}", e)));
                    }
                }
            }
            Message::StreamClear(clear) => {
                if targets_player(&clear.roles) {
                    batch.push(InboundEvent::StreamClear);
                }
            }
            Message::StreamEnd(end) => {
                if targets_player(&end.roles) {
                    self.stream = None;
                    batch.push(InboundEvent::StreamEnd);
                }
            }
            Message::ServerCommand(command) => {
                if let Some(player) = command.player {
                    batch.push(InboundEvent::Event(format!(
                        "Server command: {}",
                        player.command
                    )));
                }
            }
            other => log::debug!("Ignoring message: {:?}", other),
        }
        batch
    }

    pub(crate) fn on_binary(&mut self, bytes: &[u8]) -> Result<Option<InboundEvent>, Error> {
        let chunk = AudioChunk::parse(bytes)?;
        if !chunk.is_player_audio() {
            return Ok(None);
        }
        let Some((format, decoder)) = &self.stream else {
            return Ok(None);
        };
        let samples = decoder.decode(chunk.data)?;
        Ok(Some(InboundEvent::Audio(AudioFrame::new(
            chunk.timestamp_us,
            samples,
            format.channels,
            format.sample_rate,
        ))))
    }
}
