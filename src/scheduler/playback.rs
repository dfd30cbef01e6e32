// ABOUTME: Real-time playback scheduler run from the audio device callback
// ABOUTME: Aligns buffered frames to the timeline, corrects drift by whole frames and applies gain

use crate::audio::gain::GainRamp;
use crate::audio::ring_buffer::FrameWindow;
use crate::audio::sync_correction::{
    CorrectionCadence, CorrectionPlanner, FrameAction, DEFAULT_DEADBAND_US,
    DEFAULT_REANCHOR_THRESHOLD_US,
};
use crate::audio::{AudioFormat, AudioFrame, AudioRingBuffer, VolumeController};
use crate::sync::TimelineClock;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Counters written by the audio callback and read by anyone.
#[derive(Debug)]
pub struct PlaybackMetrics {
    playback_position_us: AtomicI64,
    underruns: AtomicU64,
    overruns: AtomicU64,
    drift_corrections: AtomicU64,
}

impl PlaybackMetrics {
    fn new() -> Self {
        Self {
            playback_position_us: AtomicI64::new(i64::MIN),
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            drift_corrections: AtomicU64::new(0),
        }
    }

    fn set_position(&self, position_us: Option<i64>) {
        self.playback_position_us
            .store(position_us.unwrap_or(i64::MIN), Ordering::Relaxed);
    }

    /// Server time of the audio currently reaching the output, if playing.
    pub fn playback_position_us(&self) -> Option<i64> {
        let position = self.playback_position_us.load(Ordering::Relaxed);
        (position != i64::MIN).then_some(position)
    }

    /// Callbacks that had to fill part of their block with silence.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    /// Callbacks that found audio older than their window still buffered.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Callbacks that dropped, repeated or re-anchored frames to stay aligned.
    pub fn drift_corrections(&self) -> u64 {
        self.drift_corrections.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.set_position(None);
        self.underruns.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.drift_corrections.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the playback timing state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingMetrics {
    /// Server timestamp of the audio currently playing, if any
    pub playback_position_us: Option<i64>,
    /// Audio buffered ahead of the device, in microseconds
    pub buffered_audio_us: i64,
    /// Callbacks with missing audio since the session started
    pub underruns: u64,
    /// Callbacks that found stale audio since the session started
    pub overruns: u64,
    /// Callbacks that applied a drift correction since the session started
    pub drift_corrections: u64,
    /// Timeline resyncs since the client was created
    pub resyncs: u64,
    /// User static delay in milliseconds
    pub static_delay_ms: f64,
}

/// Everything the audio callback shares with the event side.
#[derive(Clone)]
pub struct PlaybackContext {
    /// Buffered audio
    pub ring: Arc<AudioRingBuffer>,
    /// Server timeline estimate
    pub clock: Arc<TimelineClock>,
    /// Group and player volume
    pub volume: VolumeController,
    /// Callback-side counters
    pub metrics: Arc<PlaybackMetrics>,
    enabled: Arc<AtomicBool>,
}

impl PlaybackContext {
    /// Bundle the shared playback state. Output starts disabled.
    pub fn new(ring: Arc<AudioRingBuffer>, clock: Arc<TimelineClock>, volume: VolumeController) -> Self {
        Self {
            ring,
            clock,
            volume,
            metrics: Arc::new(PlaybackMetrics::new()),
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Allow or forbid non-silent output. Only a connected session enables it.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether non-silent output is currently allowed.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Clear counters for a fresh session.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    /// Snapshot of the timing state.
    pub fn timing_metrics(&self) -> TimingMetrics {
        TimingMetrics {
            playback_position_us: self.metrics.playback_position_us(),
            buffered_audio_us: self.ring.occupied_us(),
            underruns: self.metrics.underruns(),
            overruns: self.metrics.overruns(),
            drift_corrections: self.metrics.drift_corrections(),
            resyncs: self.clock.resync_count(),
            static_delay_ms: self.clock.static_delay_ms(),
        }
    }
}

/// Fills device buffers from the ring buffer in phase with the timeline.
///
/// Keeps a cursor in server-time microseconds for the next output frame.
/// Each callback compares the cursor with where the timeline says the
/// device should be, plans a drop/insert cadence for small errors and jumps
/// for large ones. Everything it touches per callback is pre-allocated.
pub struct PlaybackScheduler {
    ctx: PlaybackContext,
    channels: usize,
    sample_rate: u32,
    window: FrameWindow,
    cursor_us: i64,
    cursor_remainder: i64,
    started: bool,
    last_frame: Vec<f32>,
    planner: CorrectionPlanner,
    cadence: CorrectionCadence,
    ramp: GainRamp,
    ring_generation: u64,
    clock_resyncs: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler for a device opened in `format`.
    pub fn new(ctx: PlaybackContext, format: &AudioFormat) -> Self {
        Self::with_planner(
            ctx,
            format,
            CorrectionPlanner::with_thresholds(DEFAULT_DEADBAND_US, DEFAULT_REANCHOR_THRESHOLD_US),
        )
    }

    /// Create a scheduler with a custom drift planner.
    pub fn with_planner(ctx: PlaybackContext, format: &AudioFormat, planner: CorrectionPlanner) -> Self {
        let channels = usize::from(format.channels.max(1));
        let sample_rate = format.sample_rate.max(1);
        let initial_gain = ctx.volume.effective_gain();
        let ring_generation = ctx.ring.generation();
        let clock_resyncs = ctx.clock.resync_count();
        Self {
            ctx,
            channels,
            sample_rate,
            window: FrameWindow::new(),
            cursor_us: 0,
            cursor_remainder: 0,
            started: false,
            last_frame: vec![0.0; channels],
            planner,
            cadence: CorrectionCadence::default(),
            ramp: GainRamp::new(sample_rate, initial_gain),
            ring_generation,
            clock_resyncs,
        }
    }

    /// Number of interleaved output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Fill `out` (interleaved) with audio for the block whose first frame
    /// reaches the speaker at local monotonic time `playback_local_us`.
    pub fn render(&mut self, out: &mut [f32], playback_local_us: i64) {
        let frames = out.len() / self.channels;
        self.check_reset();

        if !self.ctx.is_enabled() {
            self.started = false;
            self.ctx.metrics.set_position(None);
            self.emit_silence(out, frames);
            return;
        }
        let Some(expected_us) = self.ctx.clock.server_time_at(playback_local_us) else {
            self.emit_silence(out, frames);
            return;
        };

        let mut corrected = false;
        if !self.started {
            self.anchor(expected_us);
        } else {
            let error_us = expected_us - self.cursor_us;
            let schedule = self.planner.plan(error_us, self.sample_rate);
            if schedule.reanchor {
                self.anchor(expected_us);
                corrected = true;
            } else {
                self.cadence.set_schedule(schedule);
            }
        }

        let source_frames = self.cadence.source_frames_for(frames);
        let window_start = self.cursor_us;
        let window_end = self.cursor_after(source_frames);
        let report = self.ctx.ring.pop_for(window_start, window_end, &mut self.window);
        if report.is_overrun() {
            self.ctx.metrics.overruns.fetch_add(1, Ordering::Relaxed);
        }
        self.ctx.metrics.set_position(Some(window_start));

        let was_started = self.started;
        let mut missing = 0usize;
        let mut played = 0usize;
        let mut frame_index = 0usize;

        for out_frame in out.chunks_exact_mut(self.channels) {
            match self.cadence.next_action() {
                FrameAction::Insert => {
                    out_frame.copy_from_slice(&self.last_frame);
                    corrected = true;
                    continue;
                }
                FrameAction::Drop => {
                    self.advance_cursor();
                    corrected = true;
                }
                FrameAction::Play => {}
            }

            if Self::copy_sample_at(
                self.window.frames(),
                &mut frame_index,
                self.cursor_us,
                out_frame,
            ) {
                self.last_frame.copy_from_slice(out_frame);
                played += 1;
            } else {
                out_frame.fill(0.0);
                missing += 1;
            }
            self.advance_cursor();
        }
        // Any trailing partial frame is left silent.
        let tail = frames * self.channels;
        out[tail..].fill(0.0);

        if played > 0 {
            self.started = true;
        }
        if was_started && missing > 0 {
            self.ctx.metrics.underruns.fetch_add(1, Ordering::Relaxed);
        }
        if corrected {
            self.ctx
                .metrics
                .drift_corrections
                .fetch_add(1, Ordering::Relaxed);
        }

        let target = self.ctx.volume.effective_gain();
        self.ramp.apply(out, self.channels, target);
    }

    fn check_reset(&mut self) {
        let generation = self.ctx.ring.generation();
        let resyncs = self.ctx.clock.resync_count();
        if generation != self.ring_generation || resyncs != self.clock_resyncs {
            self.ring_generation = generation;
            self.clock_resyncs = resyncs;
            self.started = false;
            self.cadence.reset();
            self.last_frame.fill(0.0);
            self.ctx.ring.recycle(&mut self.window);
        }
    }

    fn anchor(&mut self, server_us: i64) {
        self.cursor_us = server_us;
        self.cursor_remainder = 0;
        self.cadence.reset();
    }

    fn emit_silence(&mut self, out: &mut [f32], frames: usize) {
        out.fill(0.0);
        let target = self.ctx.volume.effective_gain();
        self.ramp.advance(frames, target);
    }

    fn advance_cursor(&mut self) {
        self.cursor_remainder += 1_000_000;
        let rate = i64::from(self.sample_rate);
        self.cursor_us += self.cursor_remainder / rate;
        self.cursor_remainder %= rate;
    }

    fn cursor_after(&self, frames: usize) -> i64 {
        let total = self.cursor_remainder + frames as i64 * 1_000_000;
        self.cursor_us + total / i64::from(self.sample_rate)
    }

    /// Copy the source frame playing at `cursor_us` into `out`. Frames in
    /// `window` are ascending and `frame_index` only moves forward.
    ///
    /// Frame ends are truncated to whole microseconds, so back-to-back
    /// chunks can leave a sub-sample gap. A cursor inside such a gap plays
    /// the first sample of the next frame, or holds the last sample of the
    /// previous one when the next frame is outside the window.
    fn copy_sample_at(
        window: &[AudioFrame],
        frame_index: &mut usize,
        cursor_us: i64,
        out: &mut [f32],
    ) -> bool {
        while let Some(frame) = window.get(*frame_index) {
            if frame.end_server_us() > cursor_us {
                break;
            }
            *frame_index += 1;
        }

        if let Some(frame) = window.get(*frame_index) {
            if frame.frame_count() == 0 {
                return false;
            }
            let lead_us = frame.play_at_server_us() - cursor_us;
            if lead_us <= 0 {
                let rate = i64::from(frame.sample_rate());
                let offset = (cursor_us - frame.play_at_server_us()) * rate / 1_000_000;
                let index = (offset as usize).min(frame.frame_count() - 1);
                Self::write_sample(frame, index, out);
                return true;
            }
            if lead_us < Self::sample_period_us(frame) {
                Self::write_sample(frame, 0, out);
                return true;
            }
        }

        let previous = frame_index.checked_sub(1).and_then(|i| window.get(i));
        match previous {
            Some(frame)
                if frame.frame_count() > 0
                    && cursor_us - frame.end_server_us() < Self::sample_period_us(frame) =>
            {
                Self::write_sample(frame, frame.frame_count() - 1, out);
                true
            }
            _ => false,
        }
    }

    /// One source sample period, rounded up to whole microseconds.
    fn sample_period_us(frame: &AudioFrame) -> i64 {
        let rate = i64::from(frame.sample_rate());
        (1_000_000 + rate - 1) / rate
    }

    fn write_sample(frame: &AudioFrame, index: usize, out: &mut [f32]) {
        let source_channels = usize::from(frame.channel_count());
        let base = index * source_channels;
        let samples = frame.samples();
        for (channel, sample) in out.iter_mut().enumerate() {
            let source = base + channel.min(source_channels - 1);
            *sample = samples[source].to_f32();
        }
    }
}
