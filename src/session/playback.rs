//! Playback activity: playback queue → speaker, on its own OS thread.

use std::sync::Arc;
use std::thread;

use super::SessionTimings;
use super::state::{SessionState, SessionStats};
use crate::audio::{AudioFrame, PlaybackQueue, PlaybackStream};

/// Attempts per frame before a failing write is given up.
const MAX_WRITE_ATTEMPTS: u32 = 3;

pub(crate) fn playback_thread<P: PlaybackStream>(
    stream: Arc<parking_lot::Mutex<P>>,
    queue: Arc<PlaybackQueue>,
    state: Arc<SessionState>,
    stats: Arc<SessionStats>,
    timings: SessionTimings,
) {
    log::info!("Playback started");
    // (frame, flush generation, attempts so far)
    let mut pending: Option<(AudioFrame, u64, u32)> = None;

    while state.is_playing() {
        let (frame, generation, attempts) = match pending.take() {
            Some(retry) => retry,
            None => match queue.dequeue_tagged(timings.dequeue_timeout) {
                Some((frame, generation)) => (frame, generation, 0),
                None => {
                    // 队列为空时等待一小段时间
                    thread::sleep(timings.playback_idle);
                    continue;
                }
            },
        };

        // Flushed since it was dequeued: stale
        if queue.generation() != generation {
            log::debug!("Dropping {} bytes of flushed audio", frame.len());
            continue;
        }

        let result = stream.lock().write_frame(&frame);
        match result {
            Ok(()) => SessionStats::bump(&stats.frames_played),
            Err(e) if attempts + 1 < MAX_WRITE_ATTEMPTS => {
                log::warn!("Playback write error: {}, retrying", e);
                pending = Some((frame, generation, attempts + 1));
                thread::sleep(timings.playback_idle);
            }
            Err(e) => {
                log::error!("Playback write error: {}, dropping {} bytes", e, frame.len());
                thread::sleep(timings.playback_idle);
            }
        }
    }

    log::info!("Playback stopped");
}
