//! Chat domain models and API views.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::user::UserSummary;

/// A two-participant conversation row.
///
/// The participant pair is stored normalized (`user_a < user_b`); a
/// conversation is uniquely identified by that unordered pair.
#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub last_message_text: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    /// Both participant identifiers.
    pub fn participants(&self) -> [&str; 2] {
        [&self.user_a, &self.user_b]
    }

    /// Whether the given user is one of the two participants.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The participant on the other side, if `user_id` is a participant.
    pub fn other_participant(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }

    /// Denormalized last-message snapshot, if any message was ever sent.
    pub fn last_message(&self) -> Option<LastMessage> {
        match (
            &self.last_message_text,
            &self.last_message_sender_id,
            &self.last_message_at,
        ) {
            (Some(text), Some(sender_id), Some(created_at)) => Some(LastMessage {
                text: text.clone(),
                sender_id: sender_id.clone(),
                created_at: created_at.clone(),
            }),
            _ => None,
        }
    }
}

/// An immutable message row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: String,
}

/// Last-message snapshot embedded in conversation listings.
#[derive(Debug, Clone, Serialize)]
pub struct LastMessage {
    pub text: String,
    pub sender_id: String,
    pub created_at: String,
}

/// Conversation as served to clients, with participant summaries joined in.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub id: String,
    pub participants: Vec<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub created_at: String,
    pub updated_at: String,
}

/// Message as served to clients, with the sender summary joined in.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: String,
    pub conversation_id: String,
    pub sender: UserSummary,
    pub text: String,
    pub created_at: String,
}

impl MessageView {
    /// Attach the sender's display fields to a persisted message.
    pub fn materialize(message: Message, sender: UserSummary) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender,
            text: message.text,
            created_at: message.created_at,
        }
    }
}

/// A send request, either into an existing conversation or opening one
/// with a recipient on first contact.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    pub text: String,
}
