//! audio - device access, playback buffering and diagnostics
//!
//! Capture and playback run on dedicated OS threads against ALSA; the
//! playback queue decouples them from the network side.

mod alsa_device;
mod audio_config;
mod device;
mod playback_queue;
mod wav_dump;

pub use alsa_device::{AlsaBackend, AlsaCapture, AlsaPlayback};
pub use audio_config::{AudioConfig, AudioFrame, SampleFormat};
pub use device::{
    AudioDeviceManager, CaptureStream, PcmBackend, PlaybackStream, SharedCapture, SharedPlayback,
};
pub use playback_queue::PlaybackQueue;
pub use wav_dump::WavDump;
