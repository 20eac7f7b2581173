//! Chat domain errors.

use thiserror::Error;

/// Errors raised by the conversation/message store and its service layer.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("sender is not a participant of conversation {0}")]
    NotParticipant(String),

    #[error("message text is empty")]
    EmptyText,

    #[error("message text exceeds {0} bytes")]
    TextTooLong(usize),

    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    #[error("either conversation_id or recipient_id is required")]
    MissingRecipient,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ChatError {
    /// Whether the sender did something wrong, as opposed to the store
    /// failing. Validation failures keep the connection open and are never
    /// retried; persistence failures are worth retrying.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ChatError::Database(_) | ChatError::Internal(_))
    }
}
