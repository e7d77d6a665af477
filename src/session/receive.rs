//! Receive activity: transport → playback queue, plus control events.

use std::sync::Arc;

use super::state::{SessionState, SessionStats};
use crate::audio::{AudioFrame, PlaybackQueue};
use crate::error::SessionError;
use crate::protocol::{ServerMessage, event};
use crate::transport::Transport;

/// Why the receive loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReceiveExit {
    /// The peer ended the dialog exchange
    SessionFinished,
    /// A fatal error was recorded in the session state
    Failed,
}

pub(crate) async fn receive_loop<T: Transport>(
    transport: Arc<T>,
    queue: Arc<PlaybackQueue>,
    state: Arc<SessionState>,
    stats: Arc<SessionStats>,
    max_receive_errors: u32,
) -> ReceiveExit {
    let mut consecutive_errors = 0u32;

    loop {
        let msg = match transport.receive_one().await {
            Ok(msg) => {
                consecutive_errors = 0;
                msg
            }
            Err(e) if !e.is_fatal() && consecutive_errors < max_receive_errors => {
                consecutive_errors += 1;
                log::warn!(
                    "Skipping bad message ({}/{}): {}",
                    consecutive_errors,
                    max_receive_errors,
                    e
                );
                continue;
            }
            Err(e) => {
                log::error!("Receive error: {}", e);
                state.fail(SessionError::Transport(e));
                return ReceiveExit::Failed;
            }
        };

        match msg {
            ServerMessage::Audio(data) => {
                log::trace!("Received {} bytes of audio", data.len());
                SessionStats::bump(&stats.frames_received);
                queue.enqueue(AudioFrame::new(data));
            }
            ServerMessage::Status { event: event::CLEAR_AUDIO, .. } => {
                let dropped = queue.flush();
                SessionStats::bump(&stats.flushes);
                log::info!("Clearing buffered audio, dropped {} frame(s)", dropped);
            }
            ServerMessage::Status { event: code, .. } if event::ends_session(code) => {
                log::info!("Receive session finished event: {}", code);
                state.mark_session_finished();
                return ReceiveExit::SessionFinished;
            }
            ServerMessage::Status { event, payload } => {
                log::debug!("Server event {}: {:?}", event, payload);
            }
            ServerMessage::Error { code, message } => {
                log::error!("Server error {}: {}", code, message);
                state.fail(SessionError::Remote { code, message });
                return ReceiveExit::Failed;
            }
            ServerMessage::Empty => {}
        }
    }
}
