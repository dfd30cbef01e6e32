use sendspin_player::sync::{ClockUpdate, TimelineClock, TimelineSample};

fn sample(server: i64, local: i64) -> TimelineSample {
    TimelineSample {
        server_timestamp_us: server,
        local_monotonic_us: local,
    }
}

#[test]
fn test_unsynchronized_clock_maps_nothing() {
    let clock = TimelineClock::new();
    assert!(!clock.is_synchronized());
    assert_eq!(clock.server_time_at(1_000_000), None);
    assert_eq!(clock.offset_us(), None);
}

#[test]
fn test_first_sample_sets_offset() {
    let clock = TimelineClock::new();
    assert_eq!(clock.update(sample(5_000_000, 1_000_000)), ClockUpdate::Initial);
    assert_eq!(clock.offset_us(), Some(4_000_000));
    assert_eq!(clock.server_time_at(2_000_000), Some(6_000_000));
}

#[test]
fn test_small_error_is_smoothed() {
    let clock = TimelineClock::new();
    clock.update(sample(5_000_000, 1_000_000));

    // 1 ms drift: nudged a fraction of the way, not snapped
    match clock.update(sample(6_001_000, 2_000_000)) {
        ClockUpdate::Adjusted { correction_us } => {
            assert!(correction_us > 0 && correction_us < 1_000);
        }
        other => panic!("expected an adjustment, got {:?}", other),
    }
    assert_eq!(clock.resync_count(), 0);
}

#[test]
fn test_large_jump_resyncs() {
    let clock = TimelineClock::new();
    clock.update(sample(5_000_000, 1_000_000));
    assert_eq!(
        clock.update(sample(9_000_000, 2_000_000)),
        ClockUpdate::Resync { jump_us: 3_000_000 }
    );
    assert_eq!(clock.offset_us(), Some(7_000_000));
    assert_eq!(clock.resync_count(), 1);
}

#[test]
fn test_out_of_order_sample_is_ignored() {
    let clock = TimelineClock::new();
    clock.update(sample(5_000_000, 2_000_000));
    assert_eq!(clock.update(sample(9_000_000, 1_000_000)), ClockUpdate::Ignored);
    assert_eq!(clock.offset_us(), Some(3_000_000));
}

#[test]
fn test_static_delay_shifts_mapping() {
    let clock = TimelineClock::new();
    clock.update(sample(5_000_000, 1_000_000));
    clock.set_static_delay(25.5);
    assert_eq!(clock.static_delay_ms(), 25.5);
    // Positive delay renders later: the same local instant maps to an
    // earlier point of the timeline.
    assert_eq!(clock.server_time_at(1_000_000), Some(4_974_500));
}

#[test]
fn test_now_never_goes_backwards_on_small_correction() {
    let clock = TimelineClock::new();
    clock.update(sample(5_000_000, 1_000_000));
    let before = clock.now_server_us_at(1_500_000).unwrap();

    // Offset nudged backwards by a few ms
    clock.update(sample(5_490_000, 1_500_000));
    let after = clock.now_server_us_at(1_500_000).unwrap();
    assert!(after >= before);
}

#[test]
fn test_reset_keeps_static_delay() {
    let clock = TimelineClock::new();
    clock.set_static_delay(10.0);
    clock.update(sample(5_000_000, 1_000_000));
    clock.reset();
    assert!(!clock.is_synchronized());
    assert_eq!(clock.static_delay_ms(), 10.0);
    assert_eq!(clock.update(sample(1_000, 1_000)), ClockUpdate::Initial);
}
