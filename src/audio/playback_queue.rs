//! Unbounded FIFO between the receive activity and the playback thread.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::audio_config::AudioFrame;

/// Decoded audio waiting to be played.
///
/// Enqueue never blocks or rejects: a slow speaker grows the queue instead of
/// dropping network audio. Every operation holds the same lock, so a flush
/// can't interleave with a dequeue and let a stale frame through.
///
/// Each flush bumps a generation counter. A consumer that holds on to a
/// dequeued frame (e.g. to retry a failed write) compares generations before
/// using it again.
#[derive(Default)]
pub struct PlaybackQueue {
    inner: Mutex<Inner>,
    available: Condvar,
}

#[derive(Default)]
struct Inner {
    frames: VecDeque<AudioFrame>,
    generation: u64,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, frame: AudioFrame) {
        self.inner.lock().frames.push_back(frame);
        self.available.notify_one();
    }

    /// Pop the oldest frame, waiting at most `timeout` for one to arrive.
    pub fn dequeue(&self, timeout: Duration) -> Option<AudioFrame> {
        self.dequeue_tagged(timeout).map(|(frame, _)| frame)
    }

    /// Like `dequeue`, also returning the flush generation the frame belongs to.
    pub fn dequeue_tagged(&self, timeout: Duration) -> Option<(AudioFrame, u64)> {
        let mut inner = self.inner.lock();
        if inner.frames.is_empty() {
            // A wake() or a spurious wakeup returns early; callers loop anyway.
            self.available.wait_for(&mut inner, timeout);
        }
        let generation = inner.generation;
        inner.frames.pop_front().map(|frame| (frame, generation))
    }

    /// Discard everything currently queued. Returns how many frames were dropped.
    pub fn flush(&self) -> usize {
        let mut inner = self.inner.lock();
        let dropped = inner.frames.len();
        inner.frames.clear();
        inner.generation += 1;
        dropped
    }

    /// Number of flushes so far.
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Wake any consumer blocked in `dequeue` so it can re-check its flags.
    pub fn wake(&self) {
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }
}
