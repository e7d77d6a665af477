use std::sync::Arc;

use tokio::signal;
use uuid::Uuid;

use voice_dialog_rs::audio::{AlsaBackend, AudioDeviceManager};
use voice_dialog_rs::config::Config;
use voice_dialog_rs::session::DialogSession;
use voice_dialog_rs::transport::{WsConfig, WsTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::new().map_err(anyhow::Error::msg)?;

    let session_id = Uuid::new_v4().to_string();
    let transport = Arc::new(WsTransport::new(WsConfig::from_config(&config), session_id));
    let devices = AudioDeviceManager::new(AlsaBackend::new(), config.input_audio(), config.output_audio());

    let mut session = DialogSession::new(transport, devices, config.timings());
    if let Some(path) = &config.wav_dump {
        session = session.with_wav_dump(path);
    }

    // 监听 Ctrl+C 信号，只持有本会话的状态
    let state = session.state();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                println!("Received Ctrl+C, finishing session...");
                state.interrupt();
            }
            Err(e) => eprintln!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    println!("{} {} starting session {}", env!("APP_NAME"), env!("APP_VERSION"), session.session_id());

    let summary = session.run().await?;
    println!(
        "Session finished: captured={} sent={} received={} played={} flushes={} interrupted={}",
        summary.frames_captured,
        summary.frames_sent,
        summary.frames_received,
        summary.frames_played,
        summary.flushes,
        summary.interrupted,
    );
    if let Some(logid) = summary.logid {
        println!("dialog request logid: {}", logid);
    }
    Ok(())
}
