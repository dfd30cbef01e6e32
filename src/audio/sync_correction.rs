// ABOUTME: Drift correction planning for playback alignment
// ABOUTME: Converts timeline error into a whole-frame drop/insert cadence or a re-anchor

/// Errors within this band are left alone.
pub const DEFAULT_DEADBAND_US: i64 = 2_000;

/// Errors beyond this are fixed by jumping instead of gradual correction.
pub const DEFAULT_REANCHOR_THRESHOLD_US: i64 = 500_000;

/// Correction schedule for drop/insert cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CorrectionSchedule {
    /// Insert (repeat) one frame every N frames (0 disables).
    pub insert_every_n_frames: u32,
    /// Drop (skip) one frame every N frames (0 disables).
    pub drop_every_n_frames: u32,
    /// True when re-anchoring is required.
    pub reanchor: bool,
}

impl CorrectionSchedule {
    /// True when the schedule changes the output in any way.
    pub fn is_active(&self) -> bool {
        self.reanchor || self.insert_every_n_frames > 0 || self.drop_every_n_frames > 0
    }
}

/// Planner that converts sync error into a correction schedule.
///
/// Positive error means playback is behind the timeline (drop frames to
/// catch up); negative means ahead (repeat frames to wait). Corrections are
/// spread over `target_seconds` and never exceed `max_speed_correction` of
/// the sample rate, so they stay inaudible and never change pitch.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionPlanner {
    deadband_us: i64,
    reanchor_threshold_us: i64,
    target_seconds: f64,
    max_speed_correction: f64,
}

impl CorrectionPlanner {
    /// Create a planner with default thresholds.
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_DEADBAND_US, DEFAULT_REANCHOR_THRESHOLD_US)
    }

    /// Create a planner with explicit tolerance and re-anchor threshold.
    pub fn with_thresholds(deadband_us: i64, reanchor_threshold_us: i64) -> Self {
        Self {
            deadband_us: deadband_us.max(0),
            reanchor_threshold_us: reanchor_threshold_us.max(deadband_us + 1),
            target_seconds: 2.0,
            max_speed_correction: 0.04,
        }
    }

    /// Plan a correction schedule from sync error and sample rate.
    pub fn plan(&self, error_us: i64, sample_rate: u32) -> CorrectionSchedule {
        let magnitude = error_us.saturating_abs();
        if magnitude <= self.deadband_us || sample_rate == 0 {
            return CorrectionSchedule::default();
        }
        if magnitude >= self.reanchor_threshold_us {
            return CorrectionSchedule {
                reanchor: true,
                ..CorrectionSchedule::default()
            };
        }

        let sample_rate_f = f64::from(sample_rate);
        let frames_error = (magnitude as f64 * sample_rate_f) / 1_000_000.0;
        let desired_per_sec = frames_error / self.target_seconds;
        let max_per_sec = sample_rate_f * self.max_speed_correction;
        let per_sec = desired_per_sec.min(max_per_sec);
        if per_sec <= 0.0 {
            return CorrectionSchedule::default();
        }

        let interval = ((sample_rate_f / per_sec).round() as u32).max(1);
        if error_us > 0 {
            CorrectionSchedule {
                drop_every_n_frames: interval,
                ..CorrectionSchedule::default()
            }
        } else {
            CorrectionSchedule {
                insert_every_n_frames: interval,
                ..CorrectionSchedule::default()
            }
        }
    }
}

impl Default for CorrectionPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do for the next output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Play the next source frame.
    Play,
    /// Skip one source frame, then play the following one.
    Drop,
    /// Repeat the previous output frame without consuming source.
    Insert,
}

/// Running drop/insert countdown for an active schedule.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrectionCadence {
    schedule: CorrectionSchedule,
    countdown: u32,
}

impl CorrectionCadence {
    /// Switch to `schedule`, restarting the countdown if it changed.
    pub fn set_schedule(&mut self, schedule: CorrectionSchedule) {
        if schedule != self.schedule {
            self.schedule = schedule;
            self.countdown = schedule
                .drop_every_n_frames
                .max(schedule.insert_every_n_frames);
        }
    }

    /// Drop any schedule in progress.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Action for the next output frame.
    pub fn next_action(&mut self) -> FrameAction {
        let interval = if self.schedule.drop_every_n_frames > 0 {
            self.schedule.drop_every_n_frames
        } else if self.schedule.insert_every_n_frames > 0 {
            self.schedule.insert_every_n_frames
        } else {
            return FrameAction::Play;
        };

        self.countdown = self.countdown.saturating_sub(1);
        if self.countdown > 0 {
            return FrameAction::Play;
        }
        self.countdown = interval;
        if self.schedule.drop_every_n_frames > 0 {
            FrameAction::Drop
        } else {
            FrameAction::Insert
        }
    }

    /// Number of drops or inserts the next `frames` calls to
    /// [`next_action`](Self::next_action) will produce, without advancing
    /// the countdown.
    pub fn corrections_within(&self, frames: usize) -> usize {
        let interval = self
            .schedule
            .drop_every_n_frames
            .max(self.schedule.insert_every_n_frames) as usize;
        if interval == 0 || frames == 0 {
            return 0;
        }
        let first = (self.countdown as usize).max(1);
        if first > frames {
            0
        } else {
            1 + (frames - first) / interval
        }
    }

    /// Source frames consumed while producing `frames` output frames.
    pub fn source_frames_for(&self, frames: usize) -> usize {
        let corrections = self.corrections_within(frames);
        if self.schedule.drop_every_n_frames > 0 {
            frames + corrections
        } else {
            frames.saturating_sub(corrections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_drops_every_n() {
        let mut cadence = CorrectionCadence::default();
        cadence.set_schedule(CorrectionSchedule {
            drop_every_n_frames: 3,
            ..CorrectionSchedule::default()
        });
        let actions: Vec<FrameAction> = (0..6).map(|_| cadence.next_action()).collect();
        assert_eq!(
            actions,
            vec![
                FrameAction::Play,
                FrameAction::Play,
                FrameAction::Drop,
                FrameAction::Play,
                FrameAction::Play,
                FrameAction::Drop,
            ]
        );
    }

    #[test]
    fn test_source_frames_matches_actions() {
        let mut cadence = CorrectionCadence::default();
        cadence.set_schedule(CorrectionSchedule {
            drop_every_n_frames: 4,
            ..CorrectionSchedule::default()
        });
        cadence.next_action();
        let predicted = cadence.source_frames_for(10);
        let actual: usize = (0..10)
            .map(|_| match cadence.next_action() {
                FrameAction::Play => 1,
                FrameAction::Drop => 2,
                FrameAction::Insert => 0,
            })
            .sum();
        assert_eq!(predicted, actual);
    }

    #[test]
    fn test_insert_consumes_less_source() {
        let mut cadence = CorrectionCadence::default();
        cadence.set_schedule(CorrectionSchedule {
            insert_every_n_frames: 5,
            ..CorrectionSchedule::default()
        });
        assert_eq!(cadence.source_frames_for(10), 8);
    }

    #[test]
    fn test_idle_cadence_always_plays() {
        let mut cadence = CorrectionCadence::default();
        assert!((0..100).all(|_| cadence.next_action() == FrameAction::Play));
        assert_eq!(cadence.source_frames_for(100), 100);
    }
}
