// ABOUTME: Fixed-capacity, timestamp-ordered audio buffer shared with the audio thread
// ABOUTME: Writer pushes decoded frames; the device callback pops the frames covering a window

use crate::audio::AudioFrame;
use crate::error::Error;
use crossbeam::queue::ArrayQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Default number of frame slots. Sendspin servers send ~20-25ms chunks,
/// so this covers several seconds of lead.
pub const DEFAULT_SLOT_COUNT: usize = 512;

/// Most frames a single [`AudioRingBuffer::pop_for`] call hands out.
pub const MAX_WINDOW_FRAMES: usize = 32;

/// Why a frame was handed back by [`AudioRingBuffer::push`].
#[derive(Debug)]
pub enum PushError {
    /// Accepting the frame would exceed the buffered-duration or slot capacity.
    Full(AudioFrame),
    /// The frame's time range intersects a frame already buffered.
    Overlap(AudioFrame),
    /// The frame ends before the current playback position.
    Stale(AudioFrame),
}

impl PushError {
    /// Recover the rejected frame.
    pub fn into_frame(self) -> AudioFrame {
        match self {
            PushError::Full(frame) | PushError::Overlap(frame) | PushError::Stale(frame) => frame,
        }
    }
}

impl From<PushError> for Error {
    fn from(err: PushError) -> Self {
        match err {
            PushError::Full(_) => Error::BufferFull,
            PushError::Overlap(frame) => Error::Protocol(format!(
                "audio frame at {}us overlaps buffered audio",
                frame.play_at_server_us()
            )),
            PushError::Stale(frame) => Error::Protocol(format!(
                "audio frame at {}us arrived after its play time",
                frame.play_at_server_us()
            )),
        }
    }
}

/// Result of one [`AudioRingBuffer::pop_for`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PopReport {
    /// Frames placed in the window.
    pub frames: usize,
    /// Frames that ended before the window and were evicted.
    pub stale_evicted: usize,
}

impl PopReport {
    /// No audio overlaps the window: the caller should play silence.
    pub fn is_underrun(&self) -> bool {
        self.frames == 0
    }

    /// Audio older than the window was still buffered: playback has drifted.
    pub fn is_overrun(&self) -> bool {
        self.stale_evicted > 0
    }
}

/// Pre-allocated output of [`AudioRingBuffer::pop_for`].
///
/// Owned by the reader and reused across callbacks so popping never allocates.
pub struct FrameWindow {
    frames: Vec<AudioFrame>,
}

impl FrameWindow {
    /// Allocate room for [`MAX_WINDOW_FRAMES`] frames.
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(MAX_WINDOW_FRAMES),
        }
    }

    /// Frames overlapping the last requested window, ascending by time.
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Number of frames in the window.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the last window had no audio.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn has_room(&self) -> bool {
        self.frames.len() < MAX_WINDOW_FRAMES
    }
}

impl Default for FrameWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Circular array of frame slots kept sorted by play time.
struct Slots {
    slots: Box<[Option<AudioFrame>]>,
    head: usize,
    len: usize,
    occupied_us: i64,
}

impl Slots {
    fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            slots: (0..count).map(|_| None).collect(),
            head: 0,
            len: 0,
            occupied_us: 0,
        }
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.slots.len()
    }

    fn get(&self, index: usize) -> Option<&AudioFrame> {
        if index >= self.len {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    fn front(&self) -> Option<&AudioFrame> {
        self.get(0)
    }

    fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    fn pop_front(&mut self) -> Option<AudioFrame> {
        if self.len == 0 {
            return None;
        }
        let head = self.head;
        let frame = self.slots[head].take();
        self.head = (head + 1) % self.slots.len();
        self.len -= 1;
        if let Some(ref frame) = frame {
            self.occupied_us -= frame.duration_us();
        }
        frame
    }

    /// Insert at logical `pos`, shifting later frames one slot right.
    fn insert(&mut self, pos: usize, frame: AudioFrame) {
        debug_assert!(!self.is_full());
        let mut index = self.len;
        while index > pos {
            let from = self.physical(index - 1);
            let to = self.physical(index);
            self.slots[to] = self.slots[from].take();
            index -= 1;
        }
        let at = self.physical(pos);
        self.occupied_us += frame.duration_us();
        self.slots[at] = Some(frame);
        self.len += 1;
    }
}

/// Bounded buffer of decoded audio shared by the network writer and the
/// real-time reader.
///
/// The writer side (`push`, `flush`) may shift up to one slot array's worth
/// of entries while holding the lock and never allocates inside it.
/// The reader side (`pop_for`) touches only the frames it returns and the
/// stale frames ahead of them, at most one slot array's worth. Frames the
/// reader is done with are parked in a lock-free queue and dropped by the
/// writer, so sample memory is never freed on the audio thread.
pub struct AudioRingBuffer {
    slots: Mutex<Slots>,
    retired: ArrayQueue<AudioFrame>,
    capacity_us: i64,
    occupied_us: AtomicI64,
    read_position_us: AtomicI64,
    generation: AtomicU64,
}

impl AudioRingBuffer {
    /// Create a buffer holding at most `capacity_us` of audio in
    /// [`DEFAULT_SLOT_COUNT`] slots.
    pub fn new(capacity_us: i64) -> Self {
        Self::with_slots(capacity_us, DEFAULT_SLOT_COUNT)
    }

    /// Create a buffer with an explicit slot count.
    pub fn with_slots(capacity_us: i64, slot_count: usize) -> Self {
        let slot_count = slot_count.max(1);
        Self {
            slots: Mutex::new(Slots::new(slot_count)),
            retired: ArrayQueue::new(slot_count + 2 * MAX_WINDOW_FRAMES),
            capacity_us: capacity_us.max(0),
            occupied_us: AtomicI64::new(0),
            read_position_us: AtomicI64::new(i64::MIN),
            generation: AtomicU64::new(0),
        }
    }

    /// Maximum buffered duration in microseconds.
    pub fn capacity_us(&self) -> i64 {
        self.capacity_us
    }

    /// Currently buffered duration in microseconds.
    pub fn occupied_us(&self) -> i64 {
        self.occupied_us.load(Ordering::Relaxed)
    }

    /// Number of buffered frames.
    pub fn len(&self) -> usize {
        self.slots.lock().len
    }

    /// True when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Incremented on every [`flush`](Self::flush); readers reset their
    /// playback state when it changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Enqueue a frame in play-time order.
    ///
    /// Rejects with [`PushError::Full`] if the buffered duration would exceed
    /// capacity or every slot is taken, and with [`PushError::Overlap`] if the
    /// frame intersects one already buffered. Frames that already ended
    /// before the reader's last window are evicted first.
    pub fn push(&self, frame: AudioFrame) -> Result<(), PushError> {
        self.drain_retired();
        let read_position = self.read_position_us.load(Ordering::Relaxed);
        let result = {
            let mut slots = self.slots.lock();
            while let Some(front) = slots.front() {
                if front.end_server_us() > read_position {
                    break;
                }
                if let Some(stale) = slots.pop_front() {
                    self.retire(stale);
                }
            }
            let result = Self::insert_sorted(&mut slots, frame, self.capacity_us);
            self.occupied_us.store(slots.occupied_us, Ordering::Relaxed);
            result
        };
        self.drain_retired();
        result
    }

    /// Push following the network path's overflow policy.
    ///
    /// A frame that already ended before `now_server_us` is refused as
    /// [`PushError::Stale`]. If the buffer is full, frames whose play time
    /// has passed are dropped oldest-first and the push is retried once.
    pub fn push_evicting(&self, frame: AudioFrame, now_server_us: i64) -> Result<(), PushError> {
        if frame.end_server_us() <= now_server_us {
            return Err(PushError::Stale(frame));
        }
        match self.push(frame) {
            Err(PushError::Full(frame)) => {
                let dropped = self.evict_before(now_server_us);
                if dropped == 0 {
                    return Err(PushError::Full(frame));
                }
                self.push(frame)
            }
            other => other,
        }
    }

    /// Drop buffered frames that started before `server_us`. Returns how many.
    pub fn evict_before(&self, server_us: i64) -> usize {
        let mut evicted = 0;
        {
            let mut slots = self.slots.lock();
            while let Some(front) = slots.front() {
                if front.play_at_server_us() >= server_us {
                    break;
                }
                if let Some(frame) = slots.pop_front() {
                    self.retire(frame);
                    evicted += 1;
                }
            }
            self.occupied_us.store(slots.occupied_us, Ordering::Relaxed);
        }
        self.drain_retired();
        evicted
    }

    /// Collect the frames overlapping `[window_start_us, window_end_us)` into
    /// `out`, in ascending time order.
    ///
    /// Frames that end inside the window are consumed; a frame extending past
    /// the window stays buffered and is also handed out. Frames that ended
    /// before the window are evicted and reported as an overrun. Never
    /// allocates.
    pub fn pop_for(&self, window_start_us: i64, window_end_us: i64, out: &mut FrameWindow) -> PopReport {
        self.recycle(out);
        self.read_position_us
            .store(window_start_us, Ordering::Relaxed);

        let mut report = PopReport::default();
        let mut slots = self.slots.lock();

        while let Some(front) = slots.front() {
            if front.end_server_us() > window_start_us {
                break;
            }
            if let Some(stale) = slots.pop_front() {
                self.retire(stale);
                report.stale_evicted += 1;
            }
        }

        while out.has_room() {
            let Some(front) = slots.front() else {
                break;
            };
            if front.play_at_server_us() >= window_end_us {
                break;
            }
            if front.end_server_us() <= window_end_us {
                if let Some(frame) = slots.pop_front() {
                    out.frames.push(frame);
                }
            } else {
                // Extends past the window: hand out a reference, keep it queued.
                let frame = front.clone();
                out.frames.push(frame);
                break;
            }
        }

        self.occupied_us.store(slots.occupied_us, Ordering::Relaxed);
        report.frames = out.frames.len();
        report
    }

    /// Empty the buffer and bump the generation. Used on resync, stream
    /// clear and reconnect.
    pub fn flush(&self) {
        {
            let mut slots = self.slots.lock();
            while let Some(frame) = slots.pop_front() {
                self.retire(frame);
            }
            slots.head = 0;
            slots.occupied_us = 0;
            self.occupied_us.store(0, Ordering::Relaxed);
            self.read_position_us.store(i64::MIN, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.drain_retired();
    }

    /// Hand a finished window's frames back for deferred release.
    pub fn recycle(&self, window: &mut FrameWindow) {
        for frame in window.frames.drain(..) {
            self.retire(frame);
        }
    }

    fn retire(&self, frame: AudioFrame) {
        // Only fails when the writer has stalled long enough to fill the
        // queue; the frame is then released here.
        let _ = self.retired.push(frame);
    }

    fn drain_retired(&self) {
        while self.retired.pop().is_some() {}
    }

    fn insert_sorted(slots: &mut Slots, frame: AudioFrame, capacity_us: i64) -> Result<(), PushError> {
        if slots.is_full() || slots.occupied_us + frame.duration_us() > capacity_us {
            return Err(PushError::Full(frame));
        }

        // Frames almost always arrive in order, so scan from the back.
        let mut pos = slots.len;
        while pos > 0 {
            match slots.get(pos - 1) {
                Some(prev) if prev.play_at_server_us() > frame.play_at_server_us() => pos -= 1,
                _ => break,
            }
        }

        if let Some(prev) = pos.checked_sub(1).and_then(|i| slots.get(i)) {
            if prev.end_server_us() > frame.play_at_server_us() {
                return Err(PushError::Overlap(frame));
            }
        }
        if let Some(next) = slots.get(pos) {
            if next.play_at_server_us() < frame.end_server_us() {
                return Err(PushError::Overlap(frame));
            }
        }

        slots.insert(pos, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Sample;
    use std::sync::Arc;

    /// Mono frame at 1kHz so one sample equals one millisecond.
    fn frame_ms(start_ms: i64, len_ms: usize) -> AudioFrame {
        let samples: Arc<[Sample]> = vec![Sample(start_ms as i32); len_ms].into();
        AudioFrame::new(start_ms * 1_000, samples, 1, 1_000)
    }

    #[test]
    fn test_insert_keeps_time_order() {
        let ring = AudioRingBuffer::new(1_000_000);
        for start in [40, 0, 20] {
            ring.push(frame_ms(start, 20)).unwrap();
        }
        let slots = ring.slots.lock();
        let order: Vec<i64> = (0..slots.len)
            .filter_map(|i| slots.get(i))
            .map(|f| f.play_at_server_us())
            .collect();
        assert_eq!(order, vec![0, 20_000, 40_000]);
    }

    #[test]
    fn test_wraps_around_slot_array() {
        let ring = AudioRingBuffer::with_slots(1_000_000, 3);
        let mut window = FrameWindow::new();
        for round in 0..5i64 {
            let start = round * 20;
            ring.push(frame_ms(start, 20)).unwrap();
            let report = ring.pop_for(start * 1_000, (start + 20) * 1_000, &mut window);
            assert_eq!(report.frames, 1);
            assert_eq!(window.frames()[0].play_at_server_us(), start * 1_000);
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_slot_exhaustion_is_full() {
        let ring = AudioRingBuffer::with_slots(1_000_000, 2);
        ring.push(frame_ms(0, 10)).unwrap();
        ring.push(frame_ms(10, 10)).unwrap();
        assert!(matches!(ring.push(frame_ms(20, 10)), Err(PushError::Full(_))));
    }

    #[test]
    fn test_pop_evicts_stale_frames_as_overrun() {
        let ring = AudioRingBuffer::new(1_000_000);
        ring.push(frame_ms(0, 20)).unwrap();
        ring.push(frame_ms(100, 20)).unwrap();
        let mut window = FrameWindow::new();
        let report = ring.pop_for(100_000, 120_000, &mut window);
        assert_eq!(report.stale_evicted, 1);
        assert!(report.is_overrun());
        assert_eq!(report.frames, 1);
        assert_eq!(ring.occupied_us(), 0);
    }

    #[test]
    fn test_frames_are_released_off_the_reader() {
        let ring = AudioRingBuffer::new(1_000_000);
        let frame = frame_ms(0, 20);
        let held = frame.clone();
        ring.push(frame).unwrap();

        let mut window = FrameWindow::new();
        ring.pop_for(0, 20_000, &mut window);
        // Window and `held` share the samples.
        ring.pop_for(20_000, 40_000, &mut window);
        // The window recycled its frame into the retired queue, not dropped it.
        assert_eq!(ring.retired.len(), 1);
        assert_eq!(held.samples().len(), 20);

        ring.push(frame_ms(40, 20)).unwrap();
        assert_eq!(ring.retired.len(), 0);
    }
}
