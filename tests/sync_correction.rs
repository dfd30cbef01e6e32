use sendspin_player::audio::sync_correction::{CorrectionCadence, FrameAction};
use sendspin_player::audio::{CorrectionPlanner, CorrectionSchedule};

#[test]
fn test_correction_deadband() {
    let planner = CorrectionPlanner::new();
    let schedule = planner.plan(1_000, 48_000);
    assert_eq!(schedule, CorrectionSchedule::default());
    assert!(!schedule.is_active());
}

#[test]
fn test_correction_drop_when_behind() {
    let planner = CorrectionPlanner::new();
    let schedule = planner.plan(200_000, 48_000);
    assert!(schedule.drop_every_n_frames > 0);
    assert_eq!(schedule.insert_every_n_frames, 0);
    assert!(!schedule.reanchor);
}

#[test]
fn test_correction_insert_when_ahead() {
    let planner = CorrectionPlanner::new();
    let schedule = planner.plan(-200_000, 48_000);
    assert!(schedule.insert_every_n_frames > 0);
    assert_eq!(schedule.drop_every_n_frames, 0);
    assert!(!schedule.reanchor);
}

#[test]
fn test_correction_reanchor() {
    let planner = CorrectionPlanner::new();
    assert!(planner.plan(600_000, 48_000).reanchor);
    assert!(planner.plan(-600_000, 48_000).reanchor);
}

#[test]
fn test_correction_rate_is_capped() {
    let planner = CorrectionPlanner::new();
    // 400 ms behind at 48 kHz wants 9600 frames/s over two seconds; the cap
    // is 4% of the rate, one frame in 25.
    let schedule = planner.plan(400_000, 48_000);
    assert!(schedule.drop_every_n_frames >= 25);
}

#[test]
fn test_custom_thresholds() {
    let planner = CorrectionPlanner::with_thresholds(10_000, 50_000);
    assert!(!planner.plan(8_000, 48_000).is_active());
    assert!(planner.plan(20_000, 48_000).drop_every_n_frames > 0);
    assert!(planner.plan(60_000, 48_000).reanchor);
}

#[test]
fn test_cadence_consumes_extra_source_when_dropping() {
    let mut cadence = CorrectionCadence::default();
    cadence.set_schedule(CorrectionSchedule {
        drop_every_n_frames: 4,
        ..CorrectionSchedule::default()
    });
    assert_eq!(cadence.source_frames_for(8), 10);

    let drops = (0..8)
        .filter(|_| cadence.next_action() == FrameAction::Drop)
        .count();
    assert_eq!(drops, 2);
}

#[test]
fn test_cadence_consumes_less_source_when_inserting() {
    let mut cadence = CorrectionCadence::default();
    cadence.set_schedule(CorrectionSchedule {
        insert_every_n_frames: 4,
        ..CorrectionSchedule::default()
    });
    assert_eq!(cadence.source_frames_for(8), 6);
}
