//! Chat service for send orchestration and view materialization.

use std::collections::HashMap;

use tracing::{info, instrument};

use crate::user::{UserDirectory, UserSummary};

use super::error::ChatError;
use super::models::{Conversation, ConversationView, MessageView, NewMessage};
use super::repository::ChatRepository;

/// Outcome of a successful send: the materialized message plus the
/// recipient to fan out to.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: MessageView,
    pub recipient_id: String,
}

/// Service tying the conversation/message store to the user directory.
#[derive(Debug, Clone)]
pub struct ChatService {
    repo: ChatRepository,
    users: UserDirectory,
}

impl ChatService {
    /// Create a new chat service.
    pub fn new(repo: ChatRepository, users: UserDirectory) -> Self {
        Self { repo, users }
    }

    /// Find or create the caller's conversation with a recipient.
    #[instrument(skip(self))]
    pub async fn start_conversation(
        &self,
        caller_id: &str,
        recipient_id: &str,
    ) -> Result<ConversationView, ChatError> {
        if !self.users.exists(recipient_id).await? {
            return Err(ChatError::RecipientNotFound(recipient_id.to_string()));
        }

        let conversation = self
            .repo
            .find_or_create_conversation(caller_id, recipient_id)
            .await?;
        self.conversation_view(conversation).await
    }

    /// Persist a message and resolve who should receive the live push.
    ///
    /// Succeeds regardless of whether the recipient is online; delivery to
    /// live connections is the relay's concern, catch-up is the history
    /// API's.
    #[instrument(skip(self, request), fields(conversation_id = ?request.conversation_id))]
    pub async fn send_message(
        &self,
        sender_id: &str,
        request: NewMessage,
    ) -> Result<SendOutcome, ChatError> {
        let conversation = match &request.conversation_id {
            Some(id) => self
                .repo
                .get_conversation(id)
                .await?
                .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))?,
            None => {
                let recipient_id = request
                    .recipient_id
                    .as_deref()
                    .ok_or(ChatError::MissingRecipient)?;
                if !self.users.exists(recipient_id).await? {
                    return Err(ChatError::RecipientNotFound(recipient_id.to_string()));
                }
                self.repo
                    .find_or_create_conversation(sender_id, recipient_id)
                    .await?
            }
        };

        let (message, conversation) = self
            .repo
            .append_message(&conversation.id, sender_id, &request.text)
            .await?;

        let recipient_id = conversation
            .other_participant(sender_id)
            .ok_or_else(|| ChatError::NotParticipant(conversation.id.clone()))?
            .to_string();

        info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            "Persisted message"
        );

        let sender = self.summary_for(sender_id).await?;
        Ok(SendOutcome {
            message: MessageView::materialize(message, sender),
            recipient_id,
        })
    }

    /// The caller's conversations, most recently active first, with
    /// participant summaries joined in.
    #[instrument(skip(self))]
    pub async fn conversations_for(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationView>, ChatError> {
        let conversations = self.repo.list_for_user(user_id).await?;

        let ids: Vec<&str> = conversations
            .iter()
            .flat_map(|c| c.participants())
            .collect();
        let profiles = self.users.get_many(&ids).await?;

        Ok(conversations
            .into_iter()
            .map(|c| materialize_conversation(c, &profiles))
            .collect())
    }

    /// A conversation's messages, oldest first.
    ///
    /// Rejects callers who are not participants; never silently filters.
    #[instrument(skip(self))]
    pub async fn messages_for(
        &self,
        caller_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<MessageView>, ChatError> {
        let conversation = self
            .repo
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))?;

        if !conversation.is_participant(caller_id) {
            return Err(ChatError::NotParticipant(conversation_id.to_string()));
        }

        let messages = self.repo.list_messages(conversation_id).await?;
        let profiles = self.users.get_many(&conversation.participants()).await?;

        Ok(messages
            .into_iter()
            .map(|m| {
                let sender = summary_from(&m.sender_id, &profiles);
                MessageView::materialize(m, sender)
            })
            .collect())
    }

    async fn conversation_view(
        &self,
        conversation: Conversation,
    ) -> Result<ConversationView, ChatError> {
        let profiles = self.users.get_many(&conversation.participants()).await?;
        Ok(materialize_conversation(conversation, &profiles))
    }

    async fn summary_for(&self, user_id: &str) -> Result<UserSummary, ChatError> {
        Ok(self
            .users
            .get(user_id)
            .await?
            .map(UserSummary::from)
            .unwrap_or_else(|| UserSummary::placeholder(user_id)))
    }
}

fn materialize_conversation(
    conversation: Conversation,
    profiles: &HashMap<String, crate::user::UserProfile>,
) -> ConversationView {
    let participants = conversation
        .participants()
        .map(|id| summary_from(id, profiles))
        .to_vec();

    ConversationView {
        last_message: conversation.last_message(),
        id: conversation.id,
        participants,
        created_at: conversation.created_at,
        updated_at: conversation.updated_at,
    }
}

fn summary_from(
    user_id: &str,
    profiles: &HashMap<String, crate::user::UserProfile>,
) -> UserSummary {
    profiles
        .get(user_id)
        .cloned()
        .map(UserSummary::from)
        .unwrap_or_else(|| UserSummary::placeholder(user_id))
}
