use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::types::{ChatInfo, InboundMessage, QuotedMessage, TransportEvent};

/// Sink a transport pushes its lifecycle and message events into.
pub type EventSink = mpsc::Sender<TransportEvent>;

/// A messaging transport (Telegram, WhatsApp bridge, test double, ...).
///
/// The engine only consumes this contract. Implementations own the network
/// protocol, encryption and login rendering, and report what happens through
/// the [`EventSink`] handed to them at construction.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in logs (e.g. "telegram").
    fn name(&self) -> String;

    /// Connect and authenticate. Emits `Authenticated`/`Ready` on success.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Tear down the connection without logging out.
    async fn destroy(&self) -> Result<(), TransportError>;

    /// Log the account out. The transport emits `Disconnected` afterwards.
    async fn logout(&self) -> Result<(), TransportError>;

    /// Send `text` to a chat and return the id of the delivered message.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, TransportError>;

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, TransportError>;

    /// Fetch the message `message` is replying to.
    async fn get_quoted_message(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<QuotedMessage>, TransportError>;

    /// Reply to an inbound message in the chat it came from.
    async fn reply(&self, message: &InboundMessage, text: &str) -> Result<String, TransportError> {
        self.send_message(&message.chat_id, text).await
    }
}
