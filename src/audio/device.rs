//! Device abstraction and the scoped owner of every open stream.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::audio_config::{AudioConfig, AudioFrame};
use crate::error::DeviceError;

/// A capture stream. `read_frame` must return within `timeout`.
pub trait CaptureStream: Send + 'static {
    /// Read up to one chunk. An overrun is recovered internally and whatever
    /// was captured is returned; `Ok(None)` means nothing arrived in time.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, DeviceError>;

    fn stop(&mut self);
}

/// A playback stream. `write_frame` blocks until the device accepts the
/// frame, which is the backpressure on the playback activity.
pub trait PlaybackStream: Send + 'static {
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), DeviceError>;

    fn stop(&mut self);
}

/// The audio subsystem: opens streams and is released once at the end.
pub trait PcmBackend: Send + 'static {
    type Capture: CaptureStream;
    type Playback: PlaybackStream;

    fn open_capture(&mut self, config: &AudioConfig) -> Result<Self::Capture, DeviceError>;
    fn open_playback(&mut self, config: &AudioConfig) -> Result<Self::Playback, DeviceError>;

    /// Release the subsystem handle. Called once, after all streams stopped.
    fn terminate(&mut self);
}

pub type SharedCapture<B> = Arc<Mutex<<B as PcmBackend>::Capture>>;
pub type SharedPlayback<B> = Arc<Mutex<<B as PcmBackend>::Playback>>;

/// Owns the backend and every stream it opened.
///
/// `close_all` stops each stream and then terminates the backend; it is
/// idempotent and also runs on drop, so every exit path releases the devices.
pub struct AudioDeviceManager<B: PcmBackend> {
    backend: B,
    input_config: AudioConfig,
    output_config: AudioConfig,
    input: Option<SharedCapture<B>>,
    output: Option<SharedPlayback<B>>,
    closed: bool,
}

impl<B: PcmBackend> AudioDeviceManager<B> {
    pub fn new(backend: B, input_config: AudioConfig, output_config: AudioConfig) -> Self {
        Self {
            backend,
            input_config,
            output_config,
            input: None,
            output: None,
            closed: false,
        }
    }

    pub fn input_config(&self) -> &AudioConfig {
        &self.input_config
    }

    pub fn output_config(&self) -> &AudioConfig {
        &self.output_config
    }

    /// 打开音频输入流
    pub fn open_input(&mut self) -> Result<SharedCapture<B>, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        let stream = Arc::new(Mutex::new(self.backend.open_capture(&self.input_config)?));
        self.input = Some(stream.clone());
        Ok(stream)
    }

    /// 打开音频输出流
    pub fn open_output(&mut self) -> Result<SharedPlayback<B>, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        let stream = Arc::new(Mutex::new(self.backend.open_playback(&self.output_config)?));
        self.output = Some(stream.clone());
        Ok(stream)
    }

    /// 清理音频设备资源
    pub fn close_all(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(input) = self.input.take() {
            input.lock().stop();
        }
        if let Some(output) = self.output.take() {
            output.lock().stop();
        }
        self.backend.terminate();
        log::info!("Audio devices released");
    }
}

impl<B: PcmBackend> Drop for AudioDeviceManager<B> {
    fn drop(&mut self) {
        self.close_all();
    }
}
