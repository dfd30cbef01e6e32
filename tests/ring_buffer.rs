use sendspin_player::audio::{AudioFrame, AudioRingBuffer, FrameWindow, PushError, Sample};
use std::sync::Arc;

const RATE: u32 = 48_000;

/// Stereo frame of `ms` milliseconds starting at `at_us`, every sample set to `value`.
fn frame(at_us: i64, ms: usize, value: i32) -> AudioFrame {
    let frames = RATE as usize * ms / 1000;
    let samples: Arc<[Sample]> = vec![Sample(value); frames * 2].into();
    AudioFrame::new(at_us, samples, 2, RATE)
}

#[test]
fn test_capacity_is_measured_in_time() {
    let ring = AudioRingBuffer::new(40_000);
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();
    assert_eq!(ring.occupied_us(), 40_000);

    match ring.push(frame(40_000, 20, 3)) {
        Err(PushError::Full(rejected)) => assert_eq!(rejected.play_at_server_us(), 40_000),
        other => panic!("expected Full, got {:?}", other),
    }

    // Playing the first frame frees room for the third.
    let mut window = FrameWindow::new();
    let report = ring.pop_for(0, 20_000, &mut window);
    assert_eq!(report.frames, 1);
    assert_eq!(window.frames()[0].play_at_server_us(), 0);
    ring.push(frame(40_000, 20, 3)).unwrap();
    assert_eq!(ring.len(), 2);
}

#[test]
fn test_two_frames_play_out_then_empty_window_is_silent() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();
    let mut window = FrameWindow::new();

    let report = ring.pop_for(0, 20_000, &mut window);
    assert_eq!(report.frames, 1);
    assert_eq!(window.frames()[0].samples()[0], Sample(1));

    let report = ring.pop_for(20_000, 40_000, &mut window);
    assert_eq!(report.frames, 1);
    assert_eq!(window.frames()[0].samples()[0], Sample(2));
    assert!(ring.is_empty());

    let report = ring.pop_for(40_000, 60_000, &mut window);
    assert!(report.is_underrun());
    assert!(!report.is_overrun());
    assert!(window.is_empty());
}

#[test]
fn test_out_of_order_pushes_pop_in_time_order() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(40_000, 20, 3)).unwrap();
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();

    let mut window = FrameWindow::new();
    ring.pop_for(0, 60_000, &mut window);
    let starts: Vec<i64> = window.frames().iter().map(|f| f.play_at_server_us()).collect();
    assert_eq!(starts, vec![0, 20_000, 40_000]);
    assert!(ring.is_empty());
}

#[test]
fn test_overlapping_frame_is_rejected() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(0, 20, 1)).unwrap();
    assert!(matches!(ring.push(frame(10_000, 20, 2)), Err(PushError::Overlap(_))));
}

#[test]
fn test_frame_spanning_window_edge_stays_queued() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(0, 20, 1)).unwrap();

    let mut window = FrameWindow::new();
    assert_eq!(ring.pop_for(0, 10_000, &mut window).frames, 1);
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.pop_for(10_000, 20_000, &mut window).frames, 1);
    assert!(ring.is_empty());
}

#[test]
fn test_gap_is_an_underrun() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(100_000, 20, 1)).unwrap();
    let mut window = FrameWindow::new();
    let report = ring.pop_for(0, 20_000, &mut window);
    assert!(report.is_underrun());
    assert!(!report.is_overrun());
    assert_eq!(ring.len(), 1);
}

#[test]
fn test_late_window_evicts_stale_audio() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();
    ring.push(frame(40_000, 20, 3)).unwrap();

    let mut window = FrameWindow::new();
    let report = ring.pop_for(40_000, 60_000, &mut window);
    assert_eq!(report.stale_evicted, 2);
    assert!(report.is_overrun());
    assert_eq!(report.frames, 1);
    assert_eq!(window.frames()[0].samples()[0], Sample(3));
}

#[test]
fn test_long_stall_still_returns_the_current_frame() {
    let ring = AudioRingBuffer::new(1_000_000);
    for n in 0..6 {
        ring.push(frame(n * 10_000, 10, n as i32 + 1)).unwrap();
    }

    let mut window = FrameWindow::new();
    let report = ring.pop_for(50_000, 60_000, &mut window);
    assert_eq!(report.stale_evicted, 5);
    assert!(report.is_overrun());
    assert_eq!(report.frames, 1);
    assert_eq!(window.frames()[0].samples()[0], Sample(6));
    assert!(ring.is_empty());
    assert_eq!(ring.occupied_us(), 0);
}

#[test]
fn test_push_evicting_drops_played_audio_when_full() {
    let ring = AudioRingBuffer::new(40_000);
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();

    ring.push_evicting(frame(40_000, 20, 3), 25_000).unwrap();
    assert_eq!(ring.len(), 1);
    assert_eq!(ring.occupied_us(), 20_000);
}

#[test]
fn test_push_evicting_refuses_late_frame() {
    let ring = AudioRingBuffer::new(1_000_000);
    assert!(matches!(
        ring.push_evicting(frame(0, 20, 1), 30_000),
        Err(PushError::Stale(_))
    ));
    assert!(ring.is_empty());
}

#[test]
fn test_full_without_anything_to_evict_stays_full() {
    let ring = AudioRingBuffer::new(40_000);
    ring.push(frame(100_000, 20, 1)).unwrap();
    ring.push(frame(120_000, 20, 2)).unwrap();
    assert!(matches!(
        ring.push_evicting(frame(140_000, 20, 3), 50_000),
        Err(PushError::Full(_))
    ));
}

#[test]
fn test_flush_empties_and_bumps_generation() {
    let ring = AudioRingBuffer::new(1_000_000);
    ring.push(frame(0, 20, 1)).unwrap();
    let before = ring.generation();
    ring.flush();
    assert!(ring.is_empty());
    assert_eq!(ring.occupied_us(), 0);
    assert_eq!(ring.generation(), before + 1);
}

#[test]
fn test_slot_limit_applies_independently_of_duration() {
    let ring = AudioRingBuffer::with_slots(1_000_000, 2);
    ring.push(frame(0, 20, 1)).unwrap();
    ring.push(frame(20_000, 20, 2)).unwrap();
    assert!(matches!(ring.push(frame(40_000, 20, 3)), Err(PushError::Full(_))));
}
