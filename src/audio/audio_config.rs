//! Static audio stream parameters and the raw frame type that flows between
//! the devices, the playback queue and the transport.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

/// PCM sample encoding on the wire and at the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little endian
    S16,
    /// 32-bit float little endian
    F32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::F32 => 4,
        }
    }

    pub fn bit_depth(self) -> u16 {
        (self.bytes_per_sample() * 8) as u16
    }

    pub(crate) fn alsa_format(self) -> alsa::pcm::Format {
        match self {
            SampleFormat::S16 => alsa::pcm::Format::S16LE,
            SampleFormat::F32 => alsa::pcm::Format::FloatLE,
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s16" | "int16" | "s16le" => Ok(SampleFormat::S16),
            "f32" | "float32" | "f32le" => Ok(SampleFormat::F32),
            other => Err(format!("unsupported sample format: {}", other)),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::S16 => write!(f, "s16"),
            SampleFormat::F32 => write!(f, "f32"),
        }
    }
}

/// Audio stream configuration. Built once from the static config and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// ALSA device name (e.g. "default", "plughw:0,0")
    pub device: String,
    /// Container encoding, always "pcm" for this client
    pub format: String,
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
    /// Frame size in samples per channel
    pub chunk: usize,
}

impl AudioConfig {
    /// Bytes occupied by one interleaved sample frame (all channels).
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    /// Bytes in one full chunk.
    pub fn frame_bytes(&self) -> usize {
        self.chunk * self.bytes_per_frame()
    }
}

/// One slice of raw interleaved PCM.
///
/// Produced by exactly one producer (capture device or network receiver) and
/// consumed by exactly one consumer (transport or playback device).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
