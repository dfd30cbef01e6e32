use sendspin_player::audio::{AudioFormat, AudioFrame, AudioRingBuffer, Sample, VolumeController};
use sendspin_player::scheduler::{PlaybackContext, PlaybackScheduler};
use sendspin_player::sync::{TimelineClock, TimelineSample};
use std::sync::Arc;

const RATE: u32 = 48_000;
const BLOCK: usize = 480; // 10 ms

fn stereo() -> AudioFormat {
    AudioFormat {
        sample_rate: RATE,
        channels: 2,
        bit_depth: 16,
    }
}

fn context() -> PlaybackContext {
    let ctx = PlaybackContext::new(
        Arc::new(AudioRingBuffer::new(5_000_000)),
        Arc::new(TimelineClock::new()),
        VolumeController::new(100, false),
    );
    ctx.clock.update(TimelineSample {
        server_timestamp_us: 0,
        local_monotonic_us: 0,
    });
    ctx.set_enabled(true);
    ctx
}

/// 10 ms of stereo audio at `at_us` holding a constant value.
fn block(at_us: i64, value: i32) -> AudioFrame {
    let samples: Arc<[Sample]> = vec![Sample(value); BLOCK * 2].into();
    AudioFrame::new(at_us, samples, 2, RATE)
}

fn assert_all(out: &[f32], expected: f32) {
    for (i, sample) in out.iter().enumerate() {
        assert!(
            (sample - expected).abs() < 1e-6,
            "sample {} is {}, expected {}",
            i,
            sample,
            expected
        );
    }
}

#[test]
fn test_effective_gain_is_group_times_player() {
    let ctx = context();
    ctx.volume.set_group_volume(50, false);
    ctx.volume.set_player_volume(50, false);
    ctx.ring.push(block(0, 100_000)).unwrap();

    let mut scheduler = PlaybackScheduler::new(ctx, &stereo());
    let mut out = vec![0.0f32; BLOCK * 2];
    scheduler.render(&mut out, 0);
    assert_all(&out, Sample(100_000).to_f32() * 0.25);
}

#[test]
fn test_static_delay_renders_later() {
    let ctx = context();
    ctx.ring.push(block(0, 1_000)).unwrap();
    ctx.ring.push(block(10_000, 2_000)).unwrap();

    // Without a delay, local 10ms is server 10ms: the second block.
    let plain = context();
    plain.ring.push(block(10_000, 2_000)).unwrap();
    let mut scheduler = PlaybackScheduler::new(plain, &stereo());
    let mut out = vec![0.0f32; BLOCK * 2];
    scheduler.render(&mut out, 10_000);
    assert_all(&out, Sample(2_000).to_f32());

    // A 10ms delay makes local 10ms line up with the first block.
    ctx.clock.set_static_delay(10.0);
    let mut delayed = PlaybackScheduler::new(ctx, &stereo());
    delayed.render(&mut out, 10_000);
    assert_all(&out, Sample(1_000).to_f32());
}

#[test]
fn test_consecutive_blocks_play_back_to_back() {
    let ctx = context();
    ctx.ring.push(block(0, 1_000)).unwrap();
    ctx.ring.push(block(10_000, 2_000)).unwrap();

    let mut scheduler = PlaybackScheduler::new(ctx.clone(), &stereo());
    let mut out = vec![0.0f32; BLOCK * 2];
    scheduler.render(&mut out, 0);
    assert_all(&out, Sample(1_000).to_f32());
    scheduler.render(&mut out, 10_000);
    assert_all(&out, Sample(2_000).to_f32());

    let metrics = ctx.timing_metrics();
    assert_eq!(metrics.underruns, 0);
    assert_eq!(metrics.drift_corrections, 0);
    assert_eq!(metrics.playback_position_us, Some(10_000));
    assert!(ctx.ring.is_empty());
}

#[test]
fn test_running_dry_counts_an_underrun() {
    let ctx = context();
    ctx.ring.push(block(0, 1_000)).unwrap();

    let mut scheduler = PlaybackScheduler::new(ctx.clone(), &stereo());
    let mut out = vec![0.0f32; BLOCK * 2];
    scheduler.render(&mut out, 0);
    scheduler.render(&mut out, 10_000);
    assert_all(&out, 0.0);
    assert_eq!(ctx.timing_metrics().underruns, 1);
}

#[test]
fn test_timing_metrics_report_buffer_depth() {
    let ctx = context();
    ctx.clock.set_static_delay(5.0);
    ctx.ring.push(block(0, 1)).unwrap();
    ctx.ring.push(block(10_000, 1)).unwrap();

    let metrics = ctx.timing_metrics();
    assert_eq!(metrics.buffered_audio_us, 20_000);
    assert_eq!(metrics.playback_position_us, None);
    assert_eq!(metrics.static_delay_ms, 5.0);
}

#[test]
fn test_chunks_with_fractional_duration_play_without_gaps() {
    // 1024 frames at 48 kHz last 21333.3 us, so chunk ends fall between
    // microseconds and consecutive chunks are up to 1 us apart.
    const CHUNK: i64 = 1024;
    const RENDER: usize = 512;
    const CHUNKS: i64 = 40;

    let ctx = context();
    for n in 0..CHUNKS {
        let at_us = (n * CHUNK * 1_000_000 + i64::from(RATE) / 2) / i64::from(RATE);
        let samples: Arc<[Sample]> = vec![Sample(50_000); CHUNK as usize * 2].into();
        ctx.ring.push(AudioFrame::new(at_us, samples, 2, RATE)).unwrap();
    }

    let mut scheduler = PlaybackScheduler::new(ctx.clone(), &stereo());
    let mut out = vec![0.0f32; RENDER * 2];
    let blocks = (CHUNKS * CHUNK) as usize / RENDER;
    for k in 0..blocks {
        let local_us = (k * RENDER) as i64 * 1_000_000 / i64::from(RATE);
        scheduler.render(&mut out, local_us);
        assert_all(&out, Sample(50_000).to_f32());
    }

    let metrics = ctx.timing_metrics();
    assert_eq!(metrics.underruns, 0);
    assert_eq!(metrics.drift_corrections, 0);
}
