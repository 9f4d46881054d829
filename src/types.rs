/// An inbound chat message as delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Transport id of this message.
    pub id: String,
    /// Chat the message arrived in; replies go here.
    pub chat_id: String,
    /// Sender identifier compared against the configured admin id.
    pub sender_id: String,
    pub body: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Id of the message this one replies to, if any.
    pub quoted_message_id: Option<String>,
    /// Body of the quoted message when the transport delivers it inline.
    pub quoted_body: Option<String>,
    pub has_media: bool,
    /// Transport-specific media kind ("photo", "document", "chat", ...).
    pub media_type: Option<String>,
    /// Sent by the bot account itself.
    pub from_me: bool,
}

impl InboundMessage {
    /// Plain text message from `sender_id` in its own private chat.
    #[cfg(test)]
    pub fn text(id: &str, sender_id: &str, body: &str, timestamp: i64) -> Self {
        Self {
            id: id.to_string(),
            chat_id: sender_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            timestamp,
            quoted_message_id: None,
            quoted_body: None,
            has_media: false,
            media_type: None,
            from_me: false,
        }
    }

    #[cfg(test)]
    pub fn quoting(mut self, quoted_message_id: &str) -> Self {
        self.quoted_message_id = Some(quoted_message_id.to_string());
        self
    }

    /// Media that is not plain chat text.
    pub fn has_unsupported_media(&self) -> bool {
        self.has_media && self.media_type.as_deref() != Some("chat")
    }
}

/// A message fetched by id (the target of a quoted reply).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotedMessage {
    pub id: String,
    pub body: String,
}

/// Minimal chat descriptor returned by `Transport::get_chat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatInfo {
    pub id: String,
    pub title: Option<String>,
}

/// Lifecycle and message events emitted by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    QrCode(String),
    Authenticated,
    Ready,
    Disconnected(String),
    Error(String),
    Message(InboundMessage),
}
