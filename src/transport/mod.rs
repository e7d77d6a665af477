//! The network half of a session, consumed by the orchestrator.

mod ws;

use async_trait::async_trait;

use crate::audio::AudioFrame;
use crate::error::TransportError;
use crate::protocol::ServerMessage;

pub use ws::{WsConfig, WsTransport};

/// A live dialog connection.
///
/// Every method takes `&self` so the capture, receive and control paths can
/// share one transport behind an `Arc`. Implementations serialize access to
/// their read and write halves internally.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the connection and start the dialog session.
    async fn connect(&self) -> Result<(), TransportError>;

    async fn send_audio(&self, frame: AudioFrame) -> Result<(), TransportError>;

    /// Receive one decoded message. Returns `ServerMessage::Empty` when
    /// nothing arrives within the transport's receive timeout.
    async fn receive_one(&self) -> Result<ServerMessage, TransportError>;

    async fn request_session_end(&self) -> Result<(), TransportError>;

    /// Must not panic or hang when the peer has already gone away.
    async fn request_connection_end(&self) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;

    fn session_id(&self) -> &str;

    /// Request log id reported by the service, once known.
    fn logid(&self) -> Option<String>;
}
