use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::TransportError;
use crate::traits::{EventSink, Transport};
use crate::types::{ChatInfo, InboundMessage, QuotedMessage, TransportEvent};
use crate::utils::write_json_snapshot;

/// Telegram Bot API transport.
///
/// `initialize` validates the token with `getMe` (the "authenticated" step),
/// records the bot identity under the session directory, then starts a
/// long-polling dispatcher ("ready"). When the dispatcher exits for any
/// reason a `Disconnected` event is emitted.
pub struct TelegramTransport {
    bot: Bot,
    sink: EventSink,
    session_dir: PathBuf,
    /// Present while a dispatcher is running.
    shutdown: Mutex<Option<ShutdownToken>>,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, session_dir: impl Into<PathBuf>, sink: EventSink) -> Self {
        Self {
            bot: Bot::new(bot_token),
            sink,
            session_dir: session_dir.into(),
            shutdown: Mutex::new(None),
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.sink.send(event).await.is_err() {
            warn!("Engine stopped listening to Telegram events");
        }
    }

    async fn start_dispatcher(&self) {
        let sink = self.sink.clone();
        let handler = Update::filter_message().endpoint(move |msg: Message| {
            let sink = sink.clone();
            async move {
                let inbound = to_inbound(&msg);
                if sink.send(TransportEvent::Message(inbound)).await.is_err() {
                    warn!("Dropping Telegram message, engine is gone");
                }
                respond(())
            }
        });

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler).build();
        *self.shutdown.lock().await = Some(dispatcher.shutdown_token());

        let sink = self.sink.clone();
        tokio::spawn(async move {
            dispatcher.dispatch().await;
            let _ = sink
                .send(TransportEvent::Disconnected(
                    "Telegram dispatcher stopped".to_string(),
                ))
                .await;
        });
    }

    async fn stop_dispatcher(&self) {
        let Some(token) = self.shutdown.lock().await.take() else {
            return;
        };
        match token.shutdown() {
            Ok(done) => done.await,
            Err(_) => debug!("Telegram dispatcher was not running"),
        };
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn name(&self) -> String {
        "telegram".to_string()
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        let me = self
            .bot
            .get_me()
            .await
            .map_err(|e| TransportError::Init(e.to_string()))?;
        let username = me.user.username.clone().unwrap_or_default();
        info!(bot = %username, id = me.user.id.0, "Telegram bot authenticated");
        self.emit(TransportEvent::Authenticated).await;

        let session = json!({
            "bot_id": me.user.id.0,
            "username": username,
            "authenticated_at": Utc::now().to_rfc3339(),
        });
        if let Err(e) = write_json_snapshot(&self.session_dir.join("session.json"), &session) {
            warn!("Failed to record Telegram session: {}", e);
        }

        self.stop_dispatcher().await;
        self.start_dispatcher().await;
        self.emit(TransportEvent::Ready).await;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.stop_dispatcher().await;
        Ok(())
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.bot
            .log_out()
            .await
            .map_err(|e| TransportError::Delivery(e.to_string()))?;
        self.stop_dispatcher().await;
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, TransportError> {
        let chat = parse_chat_id(chat_id)?;
        let sent = self
            .bot
            .send_message(chat, text)
            .await
            .map_err(|e| TransportError::Delivery(e.to_string()))?;
        Ok(message_key(sent.chat.id, sent.id))
    }

    async fn get_chat(&self, chat_id: &str) -> Result<ChatInfo, TransportError> {
        let chat = self
            .bot
            .get_chat(parse_chat_id(chat_id)?)
            .await
            .map_err(|e| TransportError::Delivery(e.to_string()))?;
        Ok(ChatInfo {
            id: chat.id.0.to_string(),
            title: chat.title().map(str::to_string),
        })
    }

    async fn get_quoted_message(
        &self,
        message: &InboundMessage,
    ) -> Result<Option<QuotedMessage>, TransportError> {
        // Telegram delivers the replied-to message inline with the update.
        Ok(message
            .quoted_message_id
            .as_ref()
            .zip(message.quoted_body.as_ref())
            .map(|(id, body)| QuotedMessage {
                id: id.clone(),
                body: body.clone(),
            }))
    }
}

/// Message ids are only unique per chat, so keys carry the chat id.
fn message_key(chat: ChatId, id: MessageId) -> String {
    format!("{}:{}", chat.0, id.0)
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId, TransportError> {
    chat_id
        .trim()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| TransportError::Delivery(format!("invalid Telegram chat id: {}", chat_id)))
}

fn media_kind(msg: &Message) -> Option<&'static str> {
    if msg.photo().is_some() {
        Some("photo")
    } else if msg.document().is_some() {
        Some("document")
    } else if msg.video().is_some() {
        Some("video")
    } else if msg.voice().is_some() {
        Some("voice")
    } else if msg.audio().is_some() {
        Some("audio")
    } else if msg.sticker().is_some() {
        Some("sticker")
    } else if msg.animation().is_some() {
        Some("animation")
    } else if msg.video_note().is_some() {
        Some("video_note")
    } else {
        None
    }
}

fn to_inbound(msg: &Message) -> InboundMessage {
    let chat_id = msg.chat.id.0.to_string();
    let sender_id = msg
        .from
        .as_ref()
        .map(|u| u.id.0.to_string())
        .unwrap_or_else(|| chat_id.clone());
    let media = media_kind(msg);
    let quoted = msg.reply_to_message();

    InboundMessage {
        id: message_key(msg.chat.id, msg.id),
        chat_id,
        sender_id,
        body: msg
            .text()
            .or_else(|| msg.caption())
            .unwrap_or_default()
            .to_string(),
        timestamp: msg.date.timestamp(),
        quoted_message_id: quoted.map(|q| message_key(q.chat.id, q.id)),
        quoted_body: quoted.and_then(|q| q.text().or_else(|| q.caption()).map(str::to_string)),
        has_media: media.is_some(),
        media_type: Some(media.unwrap_or("chat").to_string()),
        from_me: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_keys_are_scoped_by_chat() {
        assert_eq!(message_key(ChatId(-100123), MessageId(7)), "-100123:7");
        assert_ne!(
            message_key(ChatId(1), MessageId(7)),
            message_key(ChatId(2), MessageId(7))
        );
    }

    #[test]
    fn chat_ids_must_be_numeric() {
        assert_eq!(parse_chat_id(" 12345 ").unwrap(), ChatId(12345));
        assert!(matches!(
            parse_chat_id("admin@c.us"),
            Err(TransportError::Delivery(_))
        ));
    }

    #[tokio::test]
    async fn quoted_message_comes_from_inline_reply() {
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let dir = tempfile::TempDir::new().unwrap();
        let transport = TelegramTransport::new("123:abc", dir.path(), tx);

        let mut msg = InboundMessage::text("1:2", "1", "teach: a | b", 0).quoting("1:1");
        assert_eq!(transport.get_quoted_message(&msg).await.unwrap(), None);

        msg.quoted_body = Some("Thanks for your question!".to_string());
        let quoted = transport.get_quoted_message(&msg).await.unwrap().unwrap();
        assert_eq!(quoted.id, "1:1");
        assert_eq!(quoted.body, "Thanks for your question!");
    }
}
