//! Message parser - Parses raw text into structured messages

use crate::domain::entities::{Message, Content, MessageType, User};

/// Parses incoming text into structured Message objects.
///
/// Any text beginning with the command sentinel is a command: the token is
/// the substring up to the first whitespace run, case-folded; the argument
/// is the trimmed remainder. Everything else is conversational text.
pub struct MessageParser {
    sentinel: String,
}

impl MessageParser {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self {
            sentinel: sentinel.into(),
        }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn is_command(&self, text: &str) -> bool {
        text.starts_with(&self.sentinel)
    }

    /// Parse a text message
    pub fn parse(
        &self,
        chat_id: impl Into<String>,
        text: impl Into<String>,
        sender: Option<User>,
    ) -> Message {
        let text = text.into();
        let chat_id = chat_id.into();

        if self.is_command(&text) {
            return self.parse_command(chat_id, text, sender);
        }

        Message::new(chat_id, Content::Text(text))
            .with_message_type(MessageType::Text)
            .with_sender_opt(sender)
    }

    fn parse_command(&self, chat_id: String, text: String, sender: Option<User>) -> Message {
        let body = &text[self.sentinel.len()..];

        let (token, arg) = match body.find(char::is_whitespace) {
            Some(idx) => (&body[..idx], body[idx..].trim()),
            None => (body, ""),
        };

        Message::new(chat_id, Content::Command {
            name: token.to_lowercase(),
            arg: arg.to_string(),
        })
        .with_message_type(MessageType::Command)
        .with_sender_opt(sender)
    }
}
