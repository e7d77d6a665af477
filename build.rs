use std::fs;
use std::path::Path;
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    application: Application,
    network: Network,
    input_audio: Audio,
    output_audio: Audio,
    dialog: Dialog,
    session: Session,
    diagnostics: Diagnostics,
}

#[derive(Deserialize)]
struct Application {
    name: String,
    version: String,
}

#[derive(Deserialize)]
struct Network {
    ws_url: String,
    app_id: String,
    access_key: String,
    resource_id: String,
    app_key: String,
}

#[derive(Deserialize)]
struct Audio {
    device: String,
    format: String,
    sample_format: String,
    channels: u16,
    sample_rate: u32,
    chunk: usize,
}

#[derive(Deserialize)]
struct Dialog {
    bot_name: String,
}

#[derive(Deserialize)]
struct Session {
    poll_interval_ms: u64,
    capture_yield_ms: u64,
    capture_backoff_ms: u64,
    playback_idle_ms: u64,
    dequeue_timeout_ms: u64,
    device_timeout_ms: u64,
    receive_timeout_ms: u64,
    connect_timeout_ms: u64,
    finish_wait_ms: u64,
    max_receive_errors: u32,
}

#[derive(Deserialize)]
struct Diagnostics {
    wav_dump: String,
}

fn emit_audio(prefix: &str, audio: &Audio) {
    println!("cargo:rustc-env={}_DEVICE={}", prefix, audio.device);
    println!("cargo:rustc-env={}_FORMAT={}", prefix, audio.format);
    println!("cargo:rustc-env={}_SAMPLE_FORMAT={}", prefix, audio.sample_format);
    println!("cargo:rustc-env={}_CHANNELS={}", prefix, audio.channels);
    println!("cargo:rustc-env={}_SAMPLE_RATE={}", prefix, audio.sample_rate);
    println!("cargo:rustc-env={}_CHUNK={}", prefix, audio.chunk);
}

// 在编译时读取 config.toml 并设置环境变量
fn main() {
    println!("cargo:rerun-if-changed=config.toml");

    let config_path = Path::new("config.toml");
    if !config_path.exists() {
        panic!("config.toml not found!");
    }

    let config_str = fs::read_to_string(config_path).expect("Failed to read config.toml");
    let config: Config = toml::from_str(&config_str).expect("Failed to parse config.toml");

    println!("cargo:rustc-env=APP_NAME={}", config.application.name);
    println!("cargo:rustc-env=APP_VERSION={}", config.application.version);

    // 网络配置
    println!("cargo:rustc-env=WS_URL={}", config.network.ws_url);
    println!("cargo:rustc-env=WS_APP_ID={}", config.network.app_id);
    println!("cargo:rustc-env=WS_ACCESS_KEY={}", config.network.access_key);
    println!("cargo:rustc-env=WS_RESOURCE_ID={}", config.network.resource_id);
    println!("cargo:rustc-env=WS_APP_KEY={}", config.network.app_key);

    // 音频配置
    emit_audio("INPUT_AUDIO", &config.input_audio);
    emit_audio("OUTPUT_AUDIO", &config.output_audio);

    println!("cargo:rustc-env=DIALOG_BOT_NAME={}", config.dialog.bot_name);

    // 会话时序参数
    let s = &config.session;
    println!("cargo:rustc-env=SESSION_POLL_INTERVAL_MS={}", s.poll_interval_ms);
    println!("cargo:rustc-env=SESSION_CAPTURE_YIELD_MS={}", s.capture_yield_ms);
    println!("cargo:rustc-env=SESSION_CAPTURE_BACKOFF_MS={}", s.capture_backoff_ms);
    println!("cargo:rustc-env=SESSION_PLAYBACK_IDLE_MS={}", s.playback_idle_ms);
    println!("cargo:rustc-env=SESSION_DEQUEUE_TIMEOUT_MS={}", s.dequeue_timeout_ms);
    println!("cargo:rustc-env=SESSION_DEVICE_TIMEOUT_MS={}", s.device_timeout_ms);
    println!("cargo:rustc-env=SESSION_RECEIVE_TIMEOUT_MS={}", s.receive_timeout_ms);
    println!("cargo:rustc-env=SESSION_CONNECT_TIMEOUT_MS={}", s.connect_timeout_ms);
    println!("cargo:rustc-env=SESSION_FINISH_WAIT_MS={}", s.finish_wait_ms);
    println!("cargo:rustc-env=SESSION_MAX_RECEIVE_ERRORS={}", s.max_receive_errors);

    println!("cargo:rustc-env=DIAG_WAV_DUMP={}", config.diagnostics.wav_dump);
}
