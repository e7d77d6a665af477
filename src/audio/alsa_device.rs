//! ALSA PCM backend for capture and playback.

use std::time::{Duration, Instant};

use alsa::pcm::{Access, HwParams, PCM, State};
use alsa::{Direction, ValueOr};

use super::audio_config::{AudioConfig, AudioFrame};
use super::device::{CaptureStream, PcmBackend, PlaybackStream};
use crate::error::DeviceError;

/// Max consecutive XRUN recoveries for one frame before the rest is dropped.
const MAX_WRITE_RECOVERIES: u32 = 3;

#[derive(Debug, Default)]
pub struct AlsaBackend {
    opened: usize,
}

impl AlsaBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PcmBackend for AlsaBackend {
    type Capture = AlsaCapture;
    type Playback = AlsaPlayback;

    fn open_capture(&mut self, config: &AudioConfig) -> Result<AlsaCapture, DeviceError> {
        let pcm = open_pcm(config, Direction::Capture, "capture")?;
        self.opened += 1;
        Ok(AlsaCapture {
            pcm: Some(pcm),
            bytes_per_frame: config.bytes_per_frame(),
            chunk: config.chunk,
        })
    }

    fn open_playback(&mut self, config: &AudioConfig) -> Result<AlsaPlayback, DeviceError> {
        let pcm = open_pcm(config, Direction::Playback, "playback")?;
        self.opened += 1;
        Ok(AlsaPlayback {
            pcm: Some(pcm),
            bytes_per_frame: config.bytes_per_frame(),
        })
    }

    fn terminate(&mut self) {
        log::debug!("ALSA backend terminated after opening {} stream(s)", self.opened);
        self.opened = 0;
    }
}

pub struct AlsaCapture {
    pcm: Option<PCM>,
    bytes_per_frame: usize,
    chunk: usize,
}

impl CaptureStream for AlsaCapture {
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, DeviceError> {
        let pcm = self.pcm.as_ref().ok_or(DeviceError::Closed)?;
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; self.chunk * self.bytes_per_frame];
        let mut filled = 0;

        // A capture stream only runs once started, also after an overrun recovery
        if pcm.state() == State::Prepared {
            pcm.start()?;
        }

        while filled < buf.len() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match pcm.wait(Some(remaining.as_millis().max(1) as u32)) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    // Overrun: restart the stream and hand back what we have
                    log::warn!("ALSA capture error: {}, recovering...", e);
                    pcm.prepare()?;
                    break;
                }
            }

            // Only read what is available so the call stays bounded.
            let avail = match pcm.avail_update() {
                Ok(n) => n.max(0) as usize,
                Err(e) => {
                    log::warn!("ALSA capture overrun: {}, recovering...", e);
                    pcm.prepare()?;
                    break;
                }
            };
            let wanted = (buf.len() - filled) / self.bytes_per_frame;
            let frames = avail.min(wanted);
            if frames == 0 {
                continue;
            }

            let end = filled + frames * self.bytes_per_frame;
            match pcm.io_bytes().readi(&mut buf[filled..end]) {
                Ok(n) => filled += n * self.bytes_per_frame,
                Err(e) => {
                    log::warn!("ALSA capture overrun: {}, recovering...", e);
                    pcm.prepare()?;
                    break;
                }
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(AudioFrame::new(buf)))
    }

    fn stop(&mut self) {
        if let Some(pcm) = self.pcm.take() {
            if let Err(e) = pcm.drop() {
                log::warn!("Failed to stop capture stream: {}", e);
            }
        }
    }
}

pub struct AlsaPlayback {
    pcm: Option<PCM>,
    bytes_per_frame: usize,
}

impl PlaybackStream for AlsaPlayback {
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), DeviceError> {
        let pcm = self.pcm.as_ref().ok_or(DeviceError::Closed)?;
        let data = frame.as_bytes();
        // A trailing partial sample frame can't be written
        let total_frames = data.len() / self.bytes_per_frame;
        let mut frames_written = 0;
        let mut retry_count = 0u32;

        // Retry short writes and XRUN recovery without losing frames.
        while frames_written < total_frames {
            let offset = frames_written * self.bytes_per_frame;
            let end = total_frames * self.bytes_per_frame;
            match pcm.io_bytes().writei(&data[offset..end]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    pcm.prepare()?;

                    // 熔断器：底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                    if retry_count >= MAX_WRITE_RECOVERIES {
                        return Err(DeviceError::Io(format!(
                            "dropped {} unwritten frames after {} recoveries",
                            total_frames - frames_written,
                            retry_count
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(pcm) = self.pcm.take() {
            if let Err(e) = pcm.drop() {
                log::warn!("Failed to stop playback stream: {}", e);
            }
        }
    }
}

fn open_pcm(
    config: &AudioConfig,
    direction: Direction,
    dir_name: &'static str,
) -> Result<PCM, DeviceError> {
    let open_err = |reason: String| DeviceError::Open {
        direction: dir_name,
        reason,
    };

    let pcm = PCM::new(&config.device, direction, false)
        .map_err(|e| open_err(format!("device '{}': {}", config.device, e)))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).map_err(|e| open_err(e.to_string()))?;
        hwp.set_access(Access::RWInterleaved)
            .and_then(|_| hwp.set_format(config.sample_format.alsa_format()))
            .and_then(|_| hwp.set_channels(config.channels as u32))
            .and_then(|_| hwp.set_rate_near(config.sample_rate, ValueOr::Nearest))
            .and_then(|_| {
                hwp.set_period_size_near(config.chunk as alsa::pcm::Frames, ValueOr::Nearest)
            })
            .and_then(|_| pcm.hw_params(&hwp))
            .map_err(|e| open_err(format!("unsupported format {}: {}", config.sample_format, e)))?;
    }

    // Read back actual negotiated parameters
    let (actual_rate, actual_channels, period_size) = {
        let hwp = pcm.hw_params_current().map_err(|e| open_err(e.to_string()))?;
        let rate = hwp.get_rate().map_err(|e| open_err(e.to_string()))?;
        let ch = hwp.get_channels().map_err(|e| open_err(e.to_string()))?;
        let ps = hwp.get_period_size().map_err(|e| open_err(e.to_string()))? as usize;
        (rate, ch, ps)
    };

    if actual_rate != config.sample_rate {
        log::warn!(
            "ALSA {}: requested {}Hz, hardware negotiated {}Hz",
            dir_name,
            config.sample_rate,
            actual_rate
        );
    }

    log::info!(
        "ALSA {}: device={}, format={}, rate={}, channels={}, period_size={}",
        dir_name,
        config.device,
        config.sample_format,
        actual_rate,
        actual_channels,
        period_size,
    );

    Ok(pcm)
}
