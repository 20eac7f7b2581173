//! Repository for conversation and message persistence.

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use super::error::ChatError;
use super::models::{Conversation, Message};

/// Default upper bound for message text, in bytes of trimmed UTF-8.
const DEFAULT_MAX_TEXT_LEN: usize = 4096;

const CONVERSATION_COLUMNS: &str = "id, user_a, user_b, last_message_text, \
     last_message_sender_id, last_message_at, created_at, updated_at";

/// Repository for the conversation/message store.
#[derive(Debug, Clone)]
pub struct ChatRepository {
    pool: SqlitePool,
    max_text_len: usize,
}

impl ChatRepository {
    /// Create a new chat repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }

    /// Override the message length bound (configurable, not a correctness
    /// contract).
    pub fn with_max_text_len(mut self, max_text_len: usize) -> Self {
        self.max_text_len = max_text_len;
        self
    }

    fn generate_conversation_id() -> String {
        format!("con_{}", nanoid::nanoid!(12))
    }

    fn generate_message_id() -> String {
        format!("msg_{}", nanoid::nanoid!(12))
    }

    /// Find the conversation for an unordered participant pair, creating it
    /// if absent.
    ///
    /// Safe against concurrent duplicate creation: the normalized pair is
    /// UNIQUE, the insert is `ON CONFLICT DO NOTHING`, and the winner is
    /// re-read afterwards. Argument order is irrelevant.
    #[instrument(skip(self))]
    pub async fn find_or_create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation, ChatError> {
        if user_a == user_b {
            return Err(ChatError::SelfConversation);
        }

        let (first, second) = normalize_pair(user_a, user_b);

        if let Some(existing) = self.get_by_pair(first, second).await? {
            return Ok(existing);
        }

        let id = Self::generate_conversation_id();
        let now = timestamp();
        debug!("Creating conversation {} for ({}, {})", id, first, second);

        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_a, user_b, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (user_a, user_b) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(first)
        .bind(second)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        // Re-read rather than trusting our insert: a concurrent caller may
        // have won the conflict.
        self.get_by_pair(first, second)
            .await?
            .ok_or(ChatError::Database(sqlx::Error::RowNotFound))
    }

    /// Get a conversation by ID.
    #[instrument(skip(self))]
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>, ChatError> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        let conversation = sqlx::query_as::<_, Conversation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(conversation)
    }

    async fn get_by_pair(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Option<Conversation>, ChatError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_a = ? AND user_b = ?"
        );
        let conversation = sqlx::query_as::<_, Conversation>(&sql)
            .bind(first)
            .bind(second)
            .fetch_optional(&self.pool)
            .await?;

        Ok(conversation)
    }

    /// Append a message and refresh the owning conversation's summary in
    /// one transaction, so a reader never sees one without the other.
    ///
    /// Returns the persisted message together with the updated conversation.
    #[instrument(skip(self, text))]
    pub async fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        text: &str,
    ) -> Result<(Message, Conversation), ChatError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ChatError::EmptyText);
        }
        if trimmed.len() > self.max_text_len {
            return Err(ChatError::TextTooLong(self.max_text_len));
        }

        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        let mut conversation = sqlx::query_as::<_, Conversation>(&sql)
            .bind(conversation_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;

        if !conversation.is_participant(sender_id) {
            return Err(ChatError::NotParticipant(conversation_id.to_string()));
        }

        // Store-assigned timestamp, clamped so per-conversation order never
        // regresses even if the wall clock does.
        let mut created_at = timestamp();
        if let Some(last) = &conversation.last_message_at
            && created_at < *last
        {
            created_at = last.clone();
        }

        let id = Self::generate_message_id();
        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, text, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(trimmed)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_text = ?, last_message_sender_id = ?,
                last_message_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(trimmed)
        .bind(sender_id)
        .bind(&created_at)
        .bind(&created_at)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let message = Message {
            id,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            text: trimmed.to_string(),
            created_at: created_at.clone(),
        };

        conversation.last_message_text = Some(message.text.clone());
        conversation.last_message_sender_id = Some(message.sender_id.clone());
        conversation.last_message_at = Some(created_at.clone());
        conversation.updated_at = created_at;

        Ok((message, conversation))
    }

    /// List a user's conversations, most recently active first.
    #[instrument(skip(self))]
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>, ChatError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations \
             WHERE user_a = ? OR user_b = ? \
             ORDER BY updated_at DESC"
        );
        let conversations = sqlx::query_as::<_, Conversation>(&sql)
            .bind(user_id)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(conversations)
    }

    /// List a conversation's messages, oldest first.
    #[instrument(skip(self))]
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ChatError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, sender_id, text, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }
}

/// Normalize an unordered participant pair to its stored form.
fn normalize_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Fixed-width RFC 3339 UTC timestamp. Fixed width keeps string comparison
/// consistent with chronological order.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
