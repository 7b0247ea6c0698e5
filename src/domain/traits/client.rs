use async_trait::async_trait;
use crate::application::errors::BotError;
use crate::domain::entities::User;

/// Events emitted by a messaging client over its event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A new pairing challenge was issued. The payload is either the raw
    /// challenge string or an already-rendered `data:` URI.
    PairingCode(String),
    /// Credentials accepted. The session is not usable yet.
    Authenticated,
    /// Session fully established; messages can flow.
    Ready,
    /// Handshake rejected by the service.
    AuthFailure(String),
    /// Session lost after being established.
    Disconnected(String),
    /// Inbound text message.
    Message {
        chat_id: String,
        text: String,
        sender: Option<User>,
    },
}

/// Client information
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub instance: String,
}

/// MessagingClient trait - abstraction over the external messaging service
///
/// Implementations push `ClientEvent`s into the channel handed to them at
/// construction; the connection supervisor consumes the other end.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Begin (or re-begin) the connection handshake.
    ///
    /// Must be idempotent at the process level: calling it while a
    /// handshake is already pending must not create a second session.
    /// Handshake failures surface as `AuthFailure` events, not as errors
    /// from this call.
    async fn connect(&self) -> Result<(), BotError>;

    /// Send a text message to a chat. Returns a message id.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, BotError>;

    /// Get client info
    fn client_info(&self) -> ClientInfo;
}
