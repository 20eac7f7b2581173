//! API request handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::chat::{ConversationView, MessageView};

use super::error::ApiResult;
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// List the caller's conversations, most recently active first.
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn list_conversations(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<ConversationView>>> {
    let conversations = state.chat.conversations_for(user.id()).await?;
    info!(count = conversations.len(), "Listed conversations");
    Ok(Json(conversations))
}

/// Request body for opening (or finding) a conversation.
#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub recipient_id: String,
}

/// Find or create the caller's conversation with a recipient.
///
/// This is how a client "starts a chat" from a listing; the conversation
/// itself is only materialized here, the first message still goes through
/// the relay or appears via history.
#[instrument(skip(state, user, request), fields(user_id = %user.id()))]
pub async fn create_conversation(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<ConversationView>)> {
    // Keep the caller's own directory row fresh; the recipient must
    // already be known to the platform.
    state.users.ensure(user.id(), user.display_name()).await?;

    let conversation = state
        .chat
        .start_conversation(user.id(), &request.recipient_id)
        .await?;
    info!(conversation_id = %conversation.id, "Resolved conversation");
    Ok((StatusCode::OK, Json(conversation)))
}

/// List a conversation's messages, oldest first.
///
/// The catch-up path: clients call this on (re)connect to reconcile with
/// the durable store. 403 when the caller is not a participant.
#[instrument(skip(state, user), fields(user_id = %user.id()))]
pub async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<Vec<MessageView>>> {
    let messages = state.chat.messages_for(user.id(), &conversation_id).await?;
    Ok(Json(messages))
}
