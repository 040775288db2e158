//! Message protocol definitions
//!
//! JSON-based wire protocol using Serde. One `ChatMessage` per WebSocket
//! text frame, in both directions. Registration, chat text, logout and
//! shutdown are disjoint variants of `MessageKind` rather than overloaded
//! tag values.

use serde::{Deserialize, Serialize};

/// Kind tag of a [`ChatMessage`]
///
/// Serialized in snake_case. `Register` is only meaningful as the first
/// message on a connection; `Shutdown` asks the server to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// First message on a connection; body carries the desired username
    Register,
    /// Ordinary chat text, broadcast to all admitted sessions
    Text,
    /// Sender is leaving; also used by the server to reject a registration
    Logout,
    /// Request full server shutdown
    Shutdown,
}

/// The unit exchanged between client and server
///
/// Immutable once constructed. `sender_id` is 0 until the registry has
/// assigned an id; the server re-stamps inbound chat traffic with the
/// session's real id before fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Assigned id of the originating session (0 before assignment)
    pub sender_id: u64,
    /// Kind tag
    pub kind: MessageKind,
    /// Text payload
    pub body: String,
}

impl ChatMessage {
    /// Construct a message from its three fields
    pub fn new(sender_id: u64, kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            sender_id,
            kind,
            body: body.into(),
        }
    }

    /// Encode to the JSON wire form
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from the JSON wire form
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Moderation command embedded in chat text
///
/// A body of exactly `ban <name>` or `unban <name>` (two whitespace
/// separated tokens) is a moderation command as well as displayable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModCommand {
    Ban(String),
    Unban(String),
}

impl ModCommand {
    /// Parse a message body as a moderation command, if it is one
    ///
    /// Anything that is not exactly two tokens starting with `ban` or
    /// `unban` is ordinary text and returns `None`.
    pub fn parse(body: &str) -> Option<Self> {
        let mut tokens = body.trim().split_whitespace();
        let verb = tokens.next()?;
        let target = tokens.next()?;
        if tokens.next().is_some() {
            return None;
        }
        match verb {
            "ban" => Some(Self::Ban(target.to_string())),
            "unban" => Some(Self::Unban(target.to_string())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_round_trip() {
        let msg = ChatMessage::new(7, MessageKind::Text, "hello there");
        let decoded = ChatMessage::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.sender_id, msg.sender_id);
        assert_eq!(decoded.kind, msg.kind);
        assert_eq!(decoded.body, msg.body);
    }

    #[test]
    fn test_message_round_trip_all_kinds() {
        for kind in [
            MessageKind::Register,
            MessageKind::Text,
            MessageKind::Logout,
            MessageKind::Shutdown,
        ] {
            let msg = ChatMessage::new(0, kind, "x");
            assert_eq!(ChatMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
        }
    }

    #[test]
    fn test_kind_tag_serialize() {
        let msg = ChatMessage::new(1, MessageKind::Register, "alice");
        let json = msg.encode().unwrap();
        assert!(json.contains("\"kind\":\"register\""));
        assert!(json.contains("\"sender_id\":1"));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        let raw = r#"{"sender_id":1,"kind":"emote","body":"waves"}"#;
        assert!(ChatMessage::decode(raw).is_err());
    }

    #[test]
    fn test_mod_command_parse() {
        assert_eq!(
            ModCommand::parse("ban bob"),
            Some(ModCommand::Ban("bob".to_string()))
        );
        assert_eq!(
            ModCommand::parse("  unban bob  "),
            Some(ModCommand::Unban("bob".to_string()))
        );
    }

    #[test]
    fn test_mod_command_rejects_non_commands() {
        assert_eq!(ModCommand::parse("hello everyone"), None);
        assert_eq!(ModCommand::parse("ban"), None);
        assert_eq!(ModCommand::parse("ban bob now"), None);
        assert_eq!(ModCommand::parse("banish bob"), None);
        assert_eq!(ModCommand::parse(""), None);
    }
}
