//! Capture activity: microphone → transport.
//!
//! Device reads happen on a dedicated OS thread; a tokio task forwards the
//! frames to the transport in read order.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;

use super::SessionTimings;
use super::state::{SessionState, SessionStats};
use crate::audio::{AudioFrame, CaptureStream, WavDump};
use crate::error::SessionError;
use crate::transport::Transport;

/// Frames buffered between the capture thread and the network sender.
pub(crate) const CAPTURE_CHANNEL_DEPTH: usize = 64;

pub(crate) fn capture_thread<C: CaptureStream>(
    stream: Arc<parking_lot::Mutex<C>>,
    frame_tx: mpsc::Sender<AudioFrame>,
    mut dump: Option<WavDump>,
    state: Arc<SessionState>,
    stats: Arc<SessionStats>,
    timings: SessionTimings,
) {
    log::info!("Recording started");

    while state.is_recording() {
        let read = stream.lock().read_frame(timings.device_timeout);
        match read {
            Ok(Some(frame)) => {
                SessionStats::bump(&stats.frames_captured);
                if let Some(dump) = dump.as_mut() {
                    dump.write(&frame);
                }
                if frame_tx.blocking_send(frame).is_err() {
                    log::warn!("Failed to forward captured audio, sender dropped");
                    break;
                }
                // 避免CPU过度使用
                thread::sleep(timings.capture_yield);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Microphone read error: {}, retrying", e);
                thread::sleep(timings.capture_backoff);
            }
        }
    }

    if let Some(dump) = dump.as_mut() {
        dump.finalize();
    }
    log::info!("Recording stopped");
}

/// Forward captured frames until the capture thread hangs up.
///
/// A send failure ends the session.
pub(crate) async fn forward_loop<T: Transport>(
    transport: Arc<T>,
    mut frame_rx: mpsc::Receiver<AudioFrame>,
    state: Arc<SessionState>,
    stats: Arc<SessionStats>,
) {
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = transport.send_audio(frame).await {
            log::error!("Failed to send audio: {}", e);
            state.stop_recording();
            state.fail(SessionError::Transport(e));
            break;
        }
        SessionStats::bump(&stats.frames_sent);
    }
    log::debug!("Audio forwarding finished");
}
