// ABOUTME: Timeline clock mapping the server timeline onto the local monotonic clock
// ABOUTME: Smoothed offset tracking with resync detection and a user static delay

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Backward or forward jumps larger than this snap the offset instead of
/// smoothing toward it.
pub const DEFAULT_RESYNC_THRESHOLD_US: i64 = 100_000;

/// Fraction of the measured error applied per sample.
const DEFAULT_SMOOTHING: f64 = 0.2;

/// Largest single smoothing step.
const DEFAULT_MAX_STEP_US: i64 = 5_000;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Microseconds on the process-wide monotonic clock.
pub fn monotonic_us() -> i64 {
    instant_to_monotonic_us(Instant::now())
}

/// Convert an `Instant` to the monotonic microsecond scale used by
/// [`TimelineSample::local_monotonic_us`].
pub fn instant_to_monotonic_us(instant: Instant) -> i64 {
    let epoch = epoch();
    if instant >= epoch {
        instant.duration_since(epoch).as_micros() as i64
    } else {
        -(epoch.duration_since(instant).as_micros() as i64)
    }
}

/// One timing reference: a server timeline reading paired with the local
/// monotonic time it corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineSample {
    /// Server timeline in microseconds
    pub server_timestamp_us: i64,
    /// Local monotonic clock in microseconds (see [`monotonic_us`])
    pub local_monotonic_us: i64,
}

impl TimelineSample {
    fn offset_us(&self) -> i64 {
        self.server_timestamp_us - self.local_monotonic_us
    }
}

/// What a call to [`TimelineClock::update`] did to the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUpdate {
    /// First sample; offset taken as-is.
    Initial,
    /// Offset nudged by `correction_us`.
    Adjusted {
        /// Applied change in microseconds
        correction_us: i64,
    },
    /// Offset jumped by `jump_us`; buffered audio is no longer aligned and
    /// must be flushed.
    Resync {
        /// Snap distance in microseconds
        jump_us: i64,
    },
    /// Sample arrived with a local time earlier than a previous one.
    Ignored,
}

/// Server-timeline estimate shared by the event task (writer) and the audio
/// callback (reader).
///
/// Every field is a single atomic, so readers never observe a torn value.
/// Readers may see an offset one update stale, which the playback scheduler
/// absorbs through drift correction.
#[derive(Debug)]
pub struct TimelineClock {
    offset_us: AtomicI64,
    static_delay_us: AtomicI64,
    synchronized: AtomicBool,
    last_sample_local_us: AtomicI64,
    last_reported_us: AtomicI64,
    resyncs: AtomicU64,
    resync_threshold_us: i64,
    smoothing: f64,
    max_step_us: i64,
}

impl TimelineClock {
    /// Create an unsynchronized clock with the default resync threshold.
    pub fn new() -> Self {
        Self::with_resync_threshold(DEFAULT_RESYNC_THRESHOLD_US)
    }

    /// Create a clock that treats corrections above `threshold_us` as a resync.
    pub fn with_resync_threshold(threshold_us: i64) -> Self {
        Self {
            offset_us: AtomicI64::new(0),
            static_delay_us: AtomicI64::new(0),
            synchronized: AtomicBool::new(false),
            last_sample_local_us: AtomicI64::new(i64::MIN),
            last_reported_us: AtomicI64::new(i64::MIN),
            resyncs: AtomicU64::new(0),
            resync_threshold_us: threshold_us.max(1),
            smoothing: DEFAULT_SMOOTHING,
            max_step_us: DEFAULT_MAX_STEP_US,
        }
    }

    /// Ingest a timing reference and refit the offset.
    ///
    /// Only the event task calls this, so the read-modify-write below is not
    /// raced by another writer.
    pub fn update(&self, sample: TimelineSample) -> ClockUpdate {
        let previous_local = self.last_sample_local_us.load(Ordering::Relaxed);
        if sample.local_monotonic_us < previous_local {
            return ClockUpdate::Ignored;
        }
        self.last_sample_local_us
            .store(sample.local_monotonic_us, Ordering::Relaxed);

        let measured = sample.offset_us();
        if !self.synchronized.load(Ordering::Acquire) {
            self.offset_us.store(measured, Ordering::Relaxed);
            self.synchronized.store(true, Ordering::Release);
            return ClockUpdate::Initial;
        }

        let current = self.offset_us.load(Ordering::Relaxed);
        let error = measured - current;
        if error.saturating_abs() > self.resync_threshold_us {
            self.offset_us.store(measured, Ordering::Relaxed);
            self.last_reported_us.store(i64::MIN, Ordering::Relaxed);
            self.resyncs.fetch_add(1, Ordering::AcqRel);
            return ClockUpdate::Resync { jump_us: error };
        }

        let step = ((error as f64) * self.smoothing).round() as i64;
        let step = step.clamp(-self.max_step_us, self.max_step_us);
        self.offset_us.store(current + step, Ordering::Relaxed);
        ClockUpdate::Adjusted {
            correction_us: step,
        }
    }

    /// Map a local monotonic time to the server timeline, including the
    /// static delay. `None` until the first sample arrives.
    ///
    /// Pure mapping with no monotonic clamp; the audio callback uses it for
    /// future playback instants.
    pub fn server_time_at(&self, local_us: i64) -> Option<i64> {
        if !self.synchronized.load(Ordering::Acquire) {
            return None;
        }
        let offset = self.offset_us.load(Ordering::Relaxed);
        let delay = self.static_delay_us.load(Ordering::Relaxed);
        Some(local_us + offset - delay)
    }

    /// Estimated current server time.
    ///
    /// Never goes backwards between calls unless a resync intervened; a small
    /// backward correction holds the reported time until the estimate
    /// catches up.
    pub fn now_server_us(&self) -> Option<i64> {
        self.now_server_us_at(monotonic_us())
    }

    /// [`now_server_us`](Self::now_server_us) for an explicit local time.
    pub fn now_server_us_at(&self, local_us: i64) -> Option<i64> {
        let estimate = self.server_time_at(local_us)?;
        let previous = self.last_reported_us.fetch_max(estimate, Ordering::AcqRel);
        Some(previous.max(estimate))
    }

    /// Set the user delay in milliseconds. Positive values render later to
    /// compensate for downstream output latency.
    pub fn set_static_delay(&self, ms: f64) {
        let us = if ms.is_finite() {
            (ms * 1_000.0).round() as i64
        } else {
            0
        };
        self.static_delay_us.store(us, Ordering::Relaxed);
    }

    /// Current static delay in milliseconds.
    pub fn static_delay_ms(&self) -> f64 {
        self.static_delay_us.load(Ordering::Relaxed) as f64 / 1_000.0
    }

    /// Current server-minus-local offset, if synchronized.
    pub fn offset_us(&self) -> Option<i64> {
        self.synchronized
            .load(Ordering::Acquire)
            .then(|| self.offset_us.load(Ordering::Relaxed))
    }

    /// Check if at least one timing reference has been applied
    pub fn is_synchronized(&self) -> bool {
        self.synchronized.load(Ordering::Acquire)
    }

    /// Number of resyncs so far. Readers compare it to reset alignment.
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::Acquire)
    }

    /// Forget all samples. The static delay is kept, it belongs to the
    /// local hardware rather than the session.
    pub fn reset(&self) {
        self.synchronized.store(false, Ordering::Release);
        self.offset_us.store(0, Ordering::Relaxed);
        self.last_sample_local_us.store(i64::MIN, Ordering::Relaxed);
        self.last_reported_us.store(i64::MIN, Ordering::Relaxed);
        self.resyncs.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for TimelineClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(server: i64, local: i64) -> TimelineSample {
        TimelineSample {
            server_timestamp_us: server,
            local_monotonic_us: local,
        }
    }

    #[test]
    fn test_first_sample_sets_offset() {
        let clock = TimelineClock::new();
        assert_eq!(clock.server_time_at(0), None);
        assert_eq!(clock.update(sample(5_000_000, 1_000_000)), ClockUpdate::Initial);
        assert_eq!(clock.offset_us(), Some(4_000_000));
        assert_eq!(clock.server_time_at(2_000_000), Some(6_000_000));
    }

    #[test]
    fn test_small_error_is_smoothed_and_bounded() {
        let clock = TimelineClock::new();
        clock.update(sample(1_000_000, 0));
        // 40ms error: 20% would be 8ms, clamped to the 5ms step.
        let update = clock.update(sample(2_040_000, 1_000_000));
        assert_eq!(update, ClockUpdate::Adjusted { correction_us: 5_000 });
        assert_eq!(clock.offset_us(), Some(1_005_000));
    }

    #[test]
    fn test_large_jump_is_resync() {
        let clock = TimelineClock::new();
        clock.update(sample(1_000_000, 0));
        let update = clock.update(sample(800_000, 1_000_000));
        assert_eq!(update, ClockUpdate::Resync { jump_us: -1_200_000 });
        assert_eq!(clock.offset_us(), Some(-200_000));
        assert_eq!(clock.resync_count(), 1);
    }

    #[test]
    fn test_out_of_order_sample_ignored() {
        let clock = TimelineClock::new();
        clock.update(sample(1_000_000, 500));
        assert_eq!(clock.update(sample(1_000_000, 400)), ClockUpdate::Ignored);
    }

    #[test]
    fn test_static_delay_renders_later() {
        let clock = TimelineClock::new();
        clock.update(sample(10_000, 0));
        clock.set_static_delay(25.0);
        assert_eq!(clock.server_time_at(0), Some(-15_000));
        assert!((clock.static_delay_ms() - 25.0).abs() < f64::EPSILON);
    }
}
