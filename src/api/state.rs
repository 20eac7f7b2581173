//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::chat::ChatService;
use crate::user::UserDirectory;
use crate::ws::ConnectionRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chat service for persistence and view materialization.
    pub chat: Arc<ChatService>,
    /// Read-side user directory.
    pub users: Arc<UserDirectory>,
    /// Authentication state.
    pub auth: AuthState,
    /// Registry of live WebSocket connections.
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    /// Create new application state.
    pub fn new(chat: ChatService, users: UserDirectory, auth: AuthState) -> Self {
        Self {
            chat: Arc::new(chat),
            users: Arc::new(users),
            auth,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }
}
