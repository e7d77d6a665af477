//! Diagnostic sink that appends captured microphone audio to a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{WavSpec, WavWriter};

use super::audio_config::{AudioConfig, AudioFrame, SampleFormat};

/// Failures never reach the session: the first error disables the sink.
pub struct WavDump {
    path: PathBuf,
    format: SampleFormat,
    writer: Option<WavWriter<BufWriter<File>>>,
}

impl WavDump {
    pub fn create(path: impl AsRef<Path>, config: &AudioConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: config.channels,
            sample_rate: config.sample_rate,
            bits_per_sample: config.sample_format.bit_depth(),
            sample_format: match config.sample_format {
                SampleFormat::S16 => hound::SampleFormat::Int,
                SampleFormat::F32 => hound::SampleFormat::Float,
            },
        };
        let writer = match WavWriter::create(&path, spec) {
            Ok(w) => {
                log::info!("Dumping captured audio to {}", path.display());
                Some(w)
            }
            Err(e) => {
                log::warn!("Failed to create WAV dump {}: {}", path.display(), e);
                None
            }
        };
        Self {
            path,
            format: config.sample_format,
            writer,
        }
    }

    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    pub fn write(&mut self, frame: &AudioFrame) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = match self.format {
            SampleFormat::S16 => frame
                .as_bytes()
                .chunks_exact(2)
                .try_for_each(|b| writer.write_sample(i16::from_le_bytes([b[0], b[1]]))),
            SampleFormat::F32 => frame
                .as_bytes()
                .chunks_exact(4)
                .try_for_each(|b| writer.write_sample(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))),
        };
        if let Err(e) = result {
            log::warn!("WAV dump {} disabled: {}", self.path.display(), e);
            self.writer = None;
        }
    }

    /// Patch the header with the final length. Safe to call more than once.
    pub fn finalize(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                log::warn!("Failed to finalize WAV dump {}: {}", self.path.display(), e);
            }
        }
    }
}

impl Drop for WavDump {
    fn drop(&mut self) {
        self.finalize();
    }
}
