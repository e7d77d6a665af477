//! Flags shared between the orchestrator and its activities.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::SessionError;

/// Cross-activity session state.
///
/// The flags are written only by `interrupt`, by the terminal-event handler
/// in the receive loop and by the orchestrator's shutdown sequence. All
/// accesses are `SeqCst` so every reader sees the latest write.
pub struct SessionState {
    running: AtomicBool,
    recording: AtomicBool,
    playing: AtomicBool,
    session_finished: AtomicBool,
    interrupted: AtomicBool,
    failure: Mutex<Option<SessionError>>,
    changed: Notify,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            recording: AtomicBool::new(true),
            playing: AtomicBool::new(true),
            session_finished: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            failure: Mutex::new(None),
            changed: Notify::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn is_session_finished(&self) -> bool {
        self.session_finished.load(Ordering::SeqCst)
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// User-initiated stop: every activity winds down.
    pub fn interrupt(&self) {
        log::info!("Interrupt received, stopping session");
        self.interrupted.store(true, Ordering::SeqCst);
        self.recording.store(false, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn mark_session_finished(&self) {
        self.session_finished.store(true, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    pub fn stop_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Record a fatal error and stop the session. The first failure wins.
    pub fn fail(&self, error: SessionError) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                log::error!("Session failed: {}", error);
                *failure = Some(error);
            } else {
                log::debug!("Ignoring follow-up failure: {}", error);
            }
        }
        self.running.store(false, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    pub(crate) fn take_failure(&self) -> Option<SessionError> {
        self.failure.lock().take()
    }

    /// Wait for a state change or `poll`, whichever comes first.
    ///
    /// The timeout covers a notification racing with the caller's check.
    pub async fn wait_changed(&self, poll: Duration) {
        let _ = tokio::time::timeout(poll, self.changed.notified()).await;
    }

    /// Resolve once the session is no longer running.
    pub async fn stopped(&self, poll: Duration) {
        while self.is_running() {
            self.wait_changed(poll).await;
        }
    }
}

/// Counters reported in the session summary.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_captured: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub frames_played: AtomicU64,
    pub flushes: AtomicU64,
}

impl SessionStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
