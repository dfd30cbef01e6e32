// ABOUTME: Session-independent player state and inbound event dispatch
// ABOUTME: Routes protocol events to the clock, ring buffer, volume, state and output device

use crate::audio::{
    AudioBackend, AudioDevice, AudioFormat, AudioRingBuffer, OutputHandle, PushError,
    VolumeController,
};
use crate::client::config::ClientConfig;
use crate::client::event::ClientEvent;
use crate::protocol::{InboundEvent, SessionRequest};
use crate::scheduler::{PlaybackContext, PlaybackScheduler};
use crate::state::StateAggregator;
use crate::sync::{ClockUpdate, TimelineClock};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

const EVENT_BROADCAST_DEPTH: usize = 64;

struct OpenOutput {
    format: AudioFormat,
    // Held for its Drop.
    _handle: OutputHandle,
}

/// Everything that outlives a single session.
pub(crate) struct PlayerCore<B> {
    backend: B,
    device: Option<AudioDevice>,
    pub(crate) playback: PlaybackContext,
    pub(crate) state: StateAggregator,
    output: Mutex<Option<OpenOutput>>,
    events: broadcast::Sender<ClientEvent>,
    client_id: String,
    client_name: String,
    buffer_capacity_ms: u32,
}

impl<B: AudioBackend> PlayerCore<B> {
    pub(crate) fn new(config: &ClientConfig, backend: B, device: Option<AudioDevice>) -> Self {
        let clock = TimelineClock::new();
        clock.set_static_delay(config.static_delay_ms);
        let playback = PlaybackContext::new(
            Arc::new(AudioRingBuffer::new(config.buffer_capacity_us())),
            Arc::new(clock),
            VolumeController::new(config.player_volume, config.player_muted),
        );
        let (events, _) = broadcast::channel(EVENT_BROADCAST_DEPTH);
        Self {
            backend,
            device,
            playback,
            state: StateAggregator::new(),
            output: Mutex::new(None),
            events,
            client_id: config.client_id.clone(),
            client_name: config.client_name.clone(),
            buffer_capacity_ms: config.buffer_capacity_ms,
        }
    }

    pub(crate) fn device(&self) -> Option<&AudioDevice> {
        self.device.as_ref()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn session_request(&self, url: &str) -> SessionRequest {
        let (player_volume, player_muted) = self.playback.volume.player_volume();
        SessionRequest {
            url: url.to_string(),
            client_id: self.client_id.clone(),
            client_name: self.client_name.clone(),
            player_volume,
            player_muted,
            buffer_capacity_ms: self.buffer_capacity_ms,
        }
    }

    /// Fresh ring and remote state for a new session.
    pub(crate) fn begin_session(&self) {
        self.playback.ring.flush();
        self.playback.clock.reset();
        self.playback.volume.reset_group();
        self.playback.reset_metrics();
        self.state.reset();
    }

    /// Silence output and release the device.
    pub(crate) fn end_session(&self) {
        self.playback.set_enabled(false);
        self.close_output();
        self.playback.ring.flush();
    }

    pub(crate) fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Metadata {
                update,
                received_at,
            } => {
                self.state.apply_metadata(&update, received_at);
                self.emit(ClientEvent::MetadataUpdated(self.state.metadata()));
            }
            InboundEvent::Group(update) => {
                self.state.apply_group(&update, Instant::now());
                let group = self.state.group_info();
                log::debug!("Group update: {:?}", group);
                self.emit(ClientEvent::GroupUpdated(group));
            }
            InboundEvent::ControllerState(controller) => {
                let unknown = self.state.apply_controller(&controller);
                if !unknown.is_empty() {
                    log::debug!("Ignoring unknown controller commands: {:?}", unknown);
                }
                self.playback
                    .volume
                    .set_group_volume(controller.volume, controller.muted);
                self.emit(ClientEvent::ControllerStateUpdated {
                    volume: controller.volume.min(100),
                    muted: controller.muted,
                });
            }
            InboundEvent::Event(message) => {
                log::info!("{}", message);
                self.state.record_event(message.clone());
                self.emit(ClientEvent::Event(message));
            }
            InboundEvent::TimingReference(sample) => match self.playback.clock.update(sample) {
                ClockUpdate::Resync { jump_us } => {
                    log::warn!("Timeline jumped by {}us, flushing buffered audio", jump_us);
                    self.playback.ring.flush();
                }
                ClockUpdate::Initial => log::debug!("Timeline synchronized"),
                ClockUpdate::Adjusted { .. } | ClockUpdate::Ignored => {}
            },
            InboundEvent::StreamStart(format) => {
                self.playback.ring.flush();
                self.open_output(format);
                self.notice(format!(
                    "Stream started: {}Hz {}ch {}bit",
                    format.sample_rate, format.channels, format.bit_depth
                ));
            }
            InboundEvent::StreamClear => {
                log::debug!("Stream cleared");
                self.playback.ring.flush();
            }
            InboundEvent::StreamEnd => {
                self.playback.ring.flush();
                self.close_output();
                self.notice("Stream ended".to_string());
            }
            InboundEvent::Audio(frame) => self.enqueue(frame),
            InboundEvent::Closed(_) => {}
        }
    }

    fn notice(&self, message: String) {
        self.state.record_event(message.clone());
        self.emit(ClientEvent::Event(message));
    }

    fn enqueue(&self, frame: crate::audio::AudioFrame) {
        let ring = &self.playback.ring;
        let result = match self.playback.clock.now_server_us() {
            Some(now) => ring.push_evicting(frame, now),
            None => ring.push(frame),
        };
        match result {
            Ok(()) => {}
            Err(PushError::Stale(frame)) => {
                log::debug!("Dropping late audio at {}us", frame.play_at_server_us())
            }
            Err(PushError::Full(frame)) => {
                log::debug!("Buffer full, dropping audio at {}us", frame.play_at_server_us())
            }
            Err(PushError::Overlap(frame)) => {
                log::debug!("Dropping overlapping audio at {}us", frame.play_at_server_us())
            }
        }
    }

    fn open_output(&self, format: AudioFormat) {
        let mut output = self.output.lock();
        if output.as_ref().is_some_and(|open| open.format == format) {
            return;
        }
        // Close the old stream before opening the device again.
        output.take();

        let mut scheduler = PlaybackScheduler::new(self.playback.clone(), &format);
        let render = Box::new(move |out: &mut [f32], playback_local_us: i64| {
            scheduler.render(out, playback_local_us)
        });
        match self.backend.open(self.device.as_ref(), &format, render) {
            Ok(handle) => {
                *output = Some(OpenOutput {
                    format,
                    _handle: handle,
                });
            }
            Err(e) => {
                drop(output);
                log::error!("Failed to open audio output: {}", e);
                self.notice(format!("Audio output failed: {}", e));
            }
        }
    }

    fn close_output(&self) {
        let closed = self.output.lock().take();
        if closed.is_some() {
            log::debug!("Audio output closed");
        }
    }

    pub(crate) fn output_open(&self) -> bool {
        self.output.lock().is_some()
    }
}
