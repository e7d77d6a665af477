use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;
use uuid::Uuid;

use super::Transport;
use crate::audio::AudioFrame;
use crate::config::Config;
use crate::error::TransportError;
use crate::protocol::{
    ClientRequest, DialogPayload, ServerMessage, StartSessionPayload, TtsAudioConfig, TtsPayload,
    event, parse_server_text,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection parameters for the realtime dialog service.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub app_id: String,
    pub access_key: String,
    pub resource_id: String,
    pub app_key: String,
    pub bot_name: String,
    /// TTS audio the service should send back
    pub tts_format: String,
    pub tts_channels: u16,
    pub tts_sample_rate: u32,
    pub receive_timeout: Duration,
    /// Upper bound on the WebSocket handshake
    pub connect_timeout: Duration,
}

impl WsConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.ws_url.clone(),
            app_id: config.app_id.to_string(),
            access_key: config.access_key.to_string(),
            resource_id: config.resource_id.to_string(),
            app_key: config.app_key.to_string(),
            bot_name: config.bot_name.to_string(),
            tts_format: config.output_format.to_string(),
            tts_channels: config.output_channels,
            tts_sample_rate: config.output_sample_rate,
            receive_timeout: Duration::from_millis(config.receive_timeout_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
        }
    }
}

/// WebSocket transport: binary frames carry audio, text frames carry JSON
/// control events.
pub struct WsTransport {
    config: WsConfig,
    session_id: String,
    write: Mutex<Option<SplitSink<WsStream, Message>>>,
    read: Mutex<Option<SplitStream<WsStream>>>,
    logid: parking_lot::Mutex<Option<String>>,
}

impl WsTransport {
    pub fn new(config: WsConfig, session_id: impl Into<String>) -> Self {
        Self {
            config,
            session_id: session_id.into(),
            write: Mutex::new(None),
            read: Mutex::new(None),
            logid: parking_lot::Mutex::new(None),
        }
    }

    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        let mut write = self.write.lock().await;
        let sink = write.as_mut().ok_or(TransportError::Closed)?;
        sink.send(msg)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn send_request(&self, event: u32, with_session: bool, payload: Value) -> Result<(), TransportError> {
        let request = ClientRequest {
            event,
            session_id: with_session.then_some(self.session_id.as_str()),
            payload,
        };
        let text = serde_json::to_string(&request).map_err(|e| TransportError::Send(e.to_string()))?;
        log::debug!("Sending control request: {}", text);
        self.send(Message::Text(text.into())).await
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let connect_err = |e: &dyn std::fmt::Display| TransportError::Connect(e.to_string());

        // 根据配置构建WebSocket请求
        let url = Url::parse(&self.config.url).map_err(|e| connect_err(&e))?;
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::Connect(format!("no host in {}", self.config.url)))?;

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .method("GET")
            .uri(self.config.url.as_str())
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .header("X-Api-App-ID", &self.config.app_id)
            .header("X-Api-Access-Key", &self.config.access_key)
            .header("X-Api-Resource-Id", &self.config.resource_id)
            .header("X-Api-App-Key", &self.config.app_key)
            .header("X-Api-Connect-Id", Uuid::new_v4().to_string())
            .body(())
            .map_err(|e| connect_err(&e))?;

        log::info!("Connecting to {}...", self.config.url);
        let (ws_stream, response) = tokio::time::timeout(self.config.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                TransportError::Connect(format!("handshake timed out after {:?}", self.config.connect_timeout))
            })?
            .map_err(|e| connect_err(&e))?;

        if let Some(logid) = response
            .headers()
            .get("X-Tt-Logid")
            .and_then(|v| v.to_str().ok())
        {
            log::info!("Dialog request logid: {}", logid);
            *self.logid.lock() = Some(logid.to_string());
        }

        let (write, read) = ws_stream.split();
        *self.write.lock().await = Some(write);
        *self.read.lock().await = Some(read);

        self.send_request(event::START_CONNECTION, false, json!({})).await?;

        let start_session = StartSessionPayload {
            tts: TtsPayload {
                audio_config: TtsAudioConfig {
                    channel: self.config.tts_channels,
                    format: self.config.tts_format.clone(),
                    sample_rate: self.config.tts_sample_rate,
                },
            },
            dialog: DialogPayload {
                bot_name: self.config.bot_name.clone(),
            },
        };
        let payload =
            serde_json::to_value(start_session).map_err(|e| TransportError::Connect(e.to_string()))?;
        self.send_request(event::START_SESSION, true, payload).await?;

        log::info!("Connected, session {} started", self.session_id);
        Ok(())
    }

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), TransportError> {
        self.send(Message::Binary(frame.into_bytes())).await
    }

    async fn receive_one(&self) -> Result<ServerMessage, TransportError> {
        let mut read = self.read.lock().await;
        let stream = read.as_mut().ok_or(TransportError::Closed)?;

        let next = match tokio::time::timeout(self.config.receive_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(ServerMessage::Empty),
        };

        match next {
            Some(Ok(Message::Binary(data))) => Ok(ServerMessage::Audio(data)),
            Some(Ok(Message::Text(text))) => {
                parse_server_text(text.as_str()).map_err(TransportError::Malformed)
            }
            Some(Ok(Message::Close(frame))) => {
                log::info!("Server closed connection: {:?}", frame);
                Err(TransportError::Closed)
            }
            Some(Ok(_)) => Ok(ServerMessage::Empty),
            Some(Err(e)) => Err(TransportError::Receive(e.to_string())),
            None => Err(TransportError::Closed),
        }
    }

    async fn request_session_end(&self) -> Result<(), TransportError> {
        self.send_request(event::FINISH_SESSION, true, json!({})).await
    }

    async fn request_connection_end(&self) -> Result<(), TransportError> {
        self.send_request(event::FINISH_CONNECTION, false, json!({})).await
    }

    async fn close(&self) -> Result<(), TransportError> {
        let sink = self.write.lock().await.take();
        self.read.lock().await.take();
        if let Some(mut sink) = sink {
            // Peer may already be gone
            if let Err(e) = sink.close().await {
                log::debug!("WebSocket close: {}", e);
            }
        }
        Ok(())
    }

    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn logid(&self) -> Option<String> {
        self.logid.lock().clone()
    }
}
