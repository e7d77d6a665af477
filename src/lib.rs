//! Realtime duplex voice dialog client.
//!
//! One `DialogSession` owns the audio devices, a playback queue and a
//! transport, and runs microphone capture, network receive and speaker
//! playback concurrently until the dialog ends or is interrupted.

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DeviceError, SessionError, TransportError};
pub use session::{DialogSession, SessionPhase, SessionState, SessionSummary};
