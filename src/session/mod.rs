//! Session orchestration: lifecycle, shared state and the three activities.

mod capture;
mod dialog_session;
mod playback;
mod receive;
mod state;

use std::fmt;
use std::time::Duration;

pub use dialog_session::{DialogSession, SessionSummary};
pub use state::{SessionState, SessionStats};

/// Lifecycle of one dialog session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    Finishing,
    Closed,
    Errored,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Polling intervals and bounds for the activities.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    /// How often the orchestrator re-checks state without a notification
    pub poll_interval: Duration,
    /// Pause after each forwarded capture frame
    pub capture_yield: Duration,
    /// Pause after a failed device read
    pub capture_backoff: Duration,
    /// Pause when the playback queue is empty or a write failed
    pub playback_idle: Duration,
    pub dequeue_timeout: Duration,
    /// Upper bound on a single device read
    pub device_timeout: Duration,
    /// Bounded wait for session-finished after requesting session end
    pub finish_wait: Duration,
    /// Consecutive malformed messages tolerated by the receive loop
    pub max_receive_errors: u32,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            capture_yield: Duration::from_millis(10),
            capture_backoff: Duration::from_millis(100),
            playback_idle: Duration::from_millis(100),
            dequeue_timeout: Duration::from_millis(200),
            device_timeout: Duration::from_millis(500),
            finish_wait: Duration::from_secs(5),
            max_receive_errors: 3,
        }
    }
}
