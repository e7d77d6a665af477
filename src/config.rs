use std::time::Duration;

use crate::audio::{AudioConfig, SampleFormat};
use crate::session::SessionTimings;

#[derive(Debug, Clone)]
pub struct Config {
    // 网络配置
    pub ws_url: String,
    pub app_id: &'static str,
    pub access_key: &'static str,
    pub resource_id: &'static str,
    pub app_key: &'static str,

    // 输入音频（麦克风）
    pub input_device: &'static str,
    pub input_format: &'static str,
    pub input_sample_format: SampleFormat,
    pub input_channels: u16,
    pub input_sample_rate: u32,
    pub input_chunk: usize,

    // 输出音频（扬声器）
    pub output_device: &'static str,
    pub output_format: &'static str,
    pub output_sample_format: SampleFormat,
    pub output_channels: u16,
    pub output_sample_rate: u32,
    pub output_chunk: usize,

    pub bot_name: &'static str,

    // 会话时序参数（毫秒）
    pub poll_interval_ms: u64,
    pub capture_yield_ms: u64,
    pub capture_backoff_ms: u64,
    pub playback_idle_ms: u64,
    pub dequeue_timeout_ms: u64,
    pub device_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub finish_wait_ms: u64,
    pub max_receive_errors: u32,

    /// 麦克风原始音频保存路径，None 表示不保存
    pub wav_dump: Option<String>,
}

impl Config {
    /// 从编译时设置的环境变量创建配置
    /// 所有参数都在编译时从 config.toml 中读取，ws_url 和 wav_dump 可在运行时覆盖
    pub fn new() -> Result<Self, &'static str> {
        let ws_url = std::env::var("VOICE_DIALOG_WS_URL").unwrap_or_else(|_| env!("WS_URL").to_string());
        let wav_dump = std::env::var("VOICE_DIALOG_WAV_DUMP")
            .unwrap_or_else(|_| env!("DIAG_WAV_DUMP").to_string());
        let wav_dump = Some(wav_dump).filter(|p| !p.trim().is_empty());

        Ok(Self {
            ws_url,
            app_id: env!("WS_APP_ID"),
            access_key: env!("WS_ACCESS_KEY"),
            resource_id: env!("WS_RESOURCE_ID"),
            app_key: env!("WS_APP_KEY"),

            input_device: env!("INPUT_AUDIO_DEVICE"),
            input_format: env!("INPUT_AUDIO_FORMAT"),
            input_sample_format: env!("INPUT_AUDIO_SAMPLE_FORMAT").parse()
                .map_err(|_| "Failed to parse INPUT_AUDIO_SAMPLE_FORMAT")?,
            input_channels: env!("INPUT_AUDIO_CHANNELS").parse()
                .map_err(|_| "Failed to parse INPUT_AUDIO_CHANNELS")?,
            input_sample_rate: env!("INPUT_AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse INPUT_AUDIO_SAMPLE_RATE")?,
            input_chunk: env!("INPUT_AUDIO_CHUNK").parse()
                .map_err(|_| "Failed to parse INPUT_AUDIO_CHUNK")?,

            output_device: env!("OUTPUT_AUDIO_DEVICE"),
            output_format: env!("OUTPUT_AUDIO_FORMAT"),
            output_sample_format: env!("OUTPUT_AUDIO_SAMPLE_FORMAT").parse()
                .map_err(|_| "Failed to parse OUTPUT_AUDIO_SAMPLE_FORMAT")?,
            output_channels: env!("OUTPUT_AUDIO_CHANNELS").parse()
                .map_err(|_| "Failed to parse OUTPUT_AUDIO_CHANNELS")?,
            output_sample_rate: env!("OUTPUT_AUDIO_SAMPLE_RATE").parse()
                .map_err(|_| "Failed to parse OUTPUT_AUDIO_SAMPLE_RATE")?,
            output_chunk: env!("OUTPUT_AUDIO_CHUNK").parse()
                .map_err(|_| "Failed to parse OUTPUT_AUDIO_CHUNK")?,

            bot_name: env!("DIALOG_BOT_NAME"),

            poll_interval_ms: env!("SESSION_POLL_INTERVAL_MS").parse()
                .map_err(|_| "Failed to parse SESSION_POLL_INTERVAL_MS")?,
            capture_yield_ms: env!("SESSION_CAPTURE_YIELD_MS").parse()
                .map_err(|_| "Failed to parse SESSION_CAPTURE_YIELD_MS")?,
            capture_backoff_ms: env!("SESSION_CAPTURE_BACKOFF_MS").parse()
                .map_err(|_| "Failed to parse SESSION_CAPTURE_BACKOFF_MS")?,
            playback_idle_ms: env!("SESSION_PLAYBACK_IDLE_MS").parse()
                .map_err(|_| "Failed to parse SESSION_PLAYBACK_IDLE_MS")?,
            dequeue_timeout_ms: env!("SESSION_DEQUEUE_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse SESSION_DEQUEUE_TIMEOUT_MS")?,
            device_timeout_ms: env!("SESSION_DEVICE_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse SESSION_DEVICE_TIMEOUT_MS")?,
            receive_timeout_ms: env!("SESSION_RECEIVE_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse SESSION_RECEIVE_TIMEOUT_MS")?,
            connect_timeout_ms: env!("SESSION_CONNECT_TIMEOUT_MS").parse()
                .map_err(|_| "Failed to parse SESSION_CONNECT_TIMEOUT_MS")?,
            finish_wait_ms: env!("SESSION_FINISH_WAIT_MS").parse()
                .map_err(|_| "Failed to parse SESSION_FINISH_WAIT_MS")?,
            max_receive_errors: env!("SESSION_MAX_RECEIVE_ERRORS").parse()
                .map_err(|_| "Failed to parse SESSION_MAX_RECEIVE_ERRORS")?,

            wav_dump,
        })
    }

    pub fn input_audio(&self) -> AudioConfig {
        AudioConfig {
            device: self.input_device.to_string(),
            format: self.input_format.to_string(),
            sample_format: self.input_sample_format,
            channels: self.input_channels,
            sample_rate: self.input_sample_rate,
            chunk: self.input_chunk,
        }
    }

    pub fn output_audio(&self) -> AudioConfig {
        AudioConfig {
            device: self.output_device.to_string(),
            format: self.output_format.to_string(),
            sample_format: self.output_sample_format,
            channels: self.output_channels,
            sample_rate: self.output_sample_rate,
            chunk: self.output_chunk,
        }
    }

    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            capture_yield: Duration::from_millis(self.capture_yield_ms),
            capture_backoff: Duration::from_millis(self.capture_backoff_ms),
            playback_idle: Duration::from_millis(self.playback_idle_ms),
            dequeue_timeout: Duration::from_millis(self.dequeue_timeout_ms),
            device_timeout: Duration::from_millis(self.device_timeout_ms),
            finish_wait: Duration::from_millis(self.finish_wait_ms),
            max_receive_errors: self.max_receive_errors,
        }
    }
}
