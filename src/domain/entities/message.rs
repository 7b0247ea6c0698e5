use super::User;
use chrono::{DateTime, Utc};

/// Type of message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Command,
}

/// Message content
///
/// A command carries a single free-text argument: everything after the
/// first whitespace run, trimmed. The token is stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Command { name: String, arg: String },
}

/// Represents an incoming or outgoing message
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender: Option<User>,
    pub content: Content,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(chat_id: impl Into<String>, content: Content) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            sender: None,
            content,
            message_type: MessageType::Text,
            timestamp: Utc::now(),
        }
    }

    pub fn from_text(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(chat_id, Content::Text(text.into()))
    }

    pub fn from_command(
        chat_id: impl Into<String>,
        name: impl Into<String>,
        arg: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(chat_id, Content::Command {
            name: name.into(),
            arg: arg.into(),
        });
        msg.message_type = MessageType::Command;
        msg
    }

    pub fn with_sender_opt(mut self, user: Option<User>) -> Self {
        if let Some(u) = user {
            self.sender = Some(u);
        }
        self
    }

    pub fn with_message_type(mut self, mt: MessageType) -> Self {
        self.message_type = mt;
        self
    }
}
