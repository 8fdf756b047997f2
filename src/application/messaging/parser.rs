//! Message parser - Parses raw text into structured messages

use crate::domain::entities::{Content, Message, MessageType, User};

/// Parses incoming text into structured Message objects
pub struct MessageParser {
    command_prefix: String,
}

impl MessageParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            command_prefix: prefix.into(),
        }
    }

    /// Parse a text message, attaching the sender when known
    pub fn parse(&self, chat_id: impl Into<String>, text: impl Into<String>, sender: Option<User>) -> Message {
        let text = text.into();
        let chat_id = chat_id.into();

        if text.starts_with('/') || text.starts_with(&self.command_prefix) {
            return self.parse_command(chat_id, text, sender);
        }

        Message::new(chat_id, Content::Text(text))
            .with_message_type(MessageType::Text)
            .with_sender_opt(sender)
    }

    fn parse_command(&self, chat_id: String, text: String, sender: Option<User>) -> Message {
        let cmd_text = if let Some(stripped) = text.strip_prefix(&self.command_prefix) {
            stripped
        } else {
            text.trim_start_matches('/')
        };

        let mut parts = cmd_text.split_whitespace();
        let name = parts.next().unwrap_or("").to_string();
        let args: Vec<String> = parts.map(|s| s.to_string()).collect();

        Message::new(chat_id, Content::Command { name, args })
            .with_message_type(MessageType::Command)
            .with_sender_opt(sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_with_args() {
        let parser = MessageParser::new("/");
        let msg = parser.parse("chat", "/uninstall greet", None);

        assert_eq!(
            msg.content,
            Content::Command {
                name: "uninstall".to_string(),
                args: vec!["greet".to_string()],
            }
        );
        assert_eq!(msg.message_type, MessageType::Command);
    }

    #[test]
    fn test_parse_plain_text() {
        let parser = MessageParser::new("/");
        let msg = parser.parse("chat", "hello there", None);

        assert_eq!(msg.content, Content::Text("hello there".to_string()));
        assert!(!msg.content.is_command());
    }

    #[test]
    fn test_parse_attaches_sender() {
        let parser = MessageParser::new("/");
        let msg = parser.parse("chat", "/start", Some(User::new("42")));

        assert_eq!(msg.sender_id(), Some("42"));
    }

    #[test]
    fn test_custom_prefix() {
        let parser = MessageParser::new("!");
        let msg = parser.parse("chat", "!version", None);

        assert!(msg.content.is_command());
    }
}
