use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server event codes the session reacts to. Anything else is informational.
pub mod event {
    /// Client request: start connection
    pub const START_CONNECTION: u32 = 1;
    /// Client request: finish connection
    pub const FINISH_CONNECTION: u32 = 2;
    /// Client request: start session
    pub const START_SESSION: u32 = 100;
    /// Client request: finish session
    pub const FINISH_SESSION: u32 = 102;
    /// Server: session finished normally
    pub const SESSION_FINISHED: u32 = 152;
    /// Server: session failed
    pub const SESSION_FAILED: u32 = 153;
    /// Server: user started speaking, buffered reply audio is stale
    pub const CLEAR_AUDIO: u32 = 450;

    /// Whether `code` ends the dialog exchange.
    pub fn ends_session(code: u32) -> bool {
        code == SESSION_FINISHED || code == SESSION_FAILED
    }
}

/// One decoded message from the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Reply audio to play
    Audio(Bytes),
    /// Status event with optional JSON payload
    Status { event: u32, payload: Option<Value> },
    /// The peer reported an error; always fatal to the session
    Error { code: u32, message: String },
    /// Nothing arrived within the receive timeout
    Empty,
}

impl ServerMessage {
    pub fn status(event: u32) -> Self {
        ServerMessage::Status {
            event,
            payload: None,
        }
    }
}

// 文本信令，服务端下发：
// {"event":450,"session_id":"...","payload":{...}} 或 {"error":{"code":..,"message":".."}}
#[derive(Deserialize, Debug)]
struct ServerEnvelope {
    event: Option<u32>,
    #[allow(dead_code)]
    session_id: Option<String>,
    payload: Option<Value>,
    error: Option<ServerErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ServerErrorBody {
    #[serde(default)]
    code: u32,
    message: String,
}

/// Parse a text control message.
pub fn parse_server_text(text: &str) -> Result<ServerMessage, String> {
    let envelope: ServerEnvelope = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if let Some(err) = envelope.error {
        return Ok(ServerMessage::Error {
            code: err.code,
            message: err.message,
        });
    }
    match envelope.event {
        Some(event) => Ok(ServerMessage::Status {
            event,
            payload: envelope.payload,
        }),
        None => Err("message carries neither event nor error".to_string()),
    }
}

/// Client control request.
#[derive(Serialize, Debug)]
pub struct ClientRequest<'a> {
    pub event: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    pub payload: Value,
}

#[derive(Serialize, Debug)]
pub struct TtsAudioConfig {
    pub channel: u16,
    pub format: String,
    pub sample_rate: u32,
}

/// Body of the start-session request.
#[derive(Serialize, Debug)]
pub struct StartSessionPayload {
    pub tts: TtsPayload,
    pub dialog: DialogPayload,
}

#[derive(Serialize, Debug)]
pub struct TtsPayload {
    pub audio_config: TtsAudioConfig,
}

#[derive(Serialize, Debug)]
pub struct DialogPayload {
    pub bot_name: String,
}
