//! WebSocket protocol types.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatError, MessageView};

// ============================================================================
// Commands (Client -> Server)
// ============================================================================

/// Commands accepted from an authenticated connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Pong response to ping.
    Pong,

    /// Send a message into a conversation, or to a recipient on first
    /// contact (exactly one of the two identifiers is required).
    SendMessage {
        #[serde(default)]
        conversation_id: Option<String>,
        #[serde(default)]
        recipient_id: Option<String>,
        text: String,
        /// Opaque client-side correlation id, echoed on failure so the
        /// sending tab can match the rejection to its optimistic entry.
        #[serde(default)]
        client_ref: Option<String>,
    },
}

// ============================================================================
// Events (Server -> Client)
// ============================================================================

/// Events pushed to connected clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection registered; the relay is ready for commands.
    Connected { user_id: String },

    /// Heartbeat/keepalive ping.
    Ping,

    /// A persisted message, pushed to all live connections of both
    /// participants (including the sender's other tabs).
    Message { message: MessageView },

    /// A send request was rejected. Delivered only to the connection that
    /// issued it; the connection stays open.
    SendFailed {
        kind: SendFailureKind,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },

    /// Malformed frame or other per-connection error.
    Error { message: String },
}

/// Failure classes surfaced to the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendFailureKind {
    /// The request itself was bad (empty text, not a participant, ...).
    /// Retrying the same request will fail again.
    Validation,
    /// The referenced conversation or recipient does not exist.
    NotFound,
    /// The store write failed; nothing was delivered and a retry is
    /// reasonable.
    Persistence,
}

impl From<&ChatError> for SendFailureKind {
    fn from(err: &ChatError) -> Self {
        match err {
            ChatError::ConversationNotFound(_) | ChatError::RecipientNotFound(_) => {
                SendFailureKind::NotFound
            }
            ChatError::Database(_) | ChatError::Internal(_) => SendFailureKind::Persistence,
            _ => SendFailureKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_command_parses() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type": "send_message", "recipient_id": "usr_bob", "text": "hi"}"#,
        )
        .unwrap();

        match cmd {
            ClientCommand::SendMessage {
                conversation_id,
                recipient_id,
                text,
                client_ref,
            } => {
                assert_eq!(conversation_id, None);
                assert_eq!(recipient_id.as_deref(), Some("usr_bob"));
                assert_eq!(text, "hi");
                assert_eq!(client_ref, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result = serde_json::from_str::<ClientCommand>(r#"{"type": "subscribe"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_send_failure_kind_mapping() {
        assert_eq!(
            SendFailureKind::from(&ChatError::EmptyText),
            SendFailureKind::Validation
        );
        assert_eq!(
            SendFailureKind::from(&ChatError::NotParticipant("con_1".into())),
            SendFailureKind::Validation
        );
        assert_eq!(
            SendFailureKind::from(&ChatError::ConversationNotFound("con_1".into())),
            SendFailureKind::NotFound
        );
        assert_eq!(
            SendFailureKind::from(&ChatError::Database(sqlx::Error::RowNotFound)),
            SendFailureKind::Persistence
        );
    }

    #[test]
    fn test_server_event_wire_shape() {
        let json = serde_json::to_value(ServerEvent::Connected {
            user_id: "usr_alice".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["user_id"], "usr_alice");
    }
}
