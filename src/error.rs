//! Error taxonomy for a dialog session.

use thiserror::Error;

/// Audio device failures.
///
/// `Open` is fatal to session start. Everything else is reported by the
/// capture and playback activities, which log it and retry.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("failed to open {direction} device: {reason}")]
    Open {
        direction: &'static str,
        reason: String,
    },

    #[error("device I/O error: {0}")]
    Io(String),

    #[error("device buffer overrun")]
    Overrun,

    #[error("device stream already closed")]
    Closed,
}

impl From<alsa::Error> for DeviceError {
    fn from(e: alsa::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Whether the receive loop must give up on this error.
    ///
    /// A malformed message leaves the connection usable; anything else means
    /// the peer is gone or the socket is broken.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Malformed(_))
    }
}

/// The failure side of a session's terminal outcome.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote error {code}: {message}")]
    Remote { code: u32, message: String },

    #[error("session can only run once, current phase: {0}")]
    NotIdle(crate::session::SessionPhase),
}
