//! Test utilities and common setup.

use axum::Router;
use parley::api;
use parley::auth::{AuthConfig, AuthState, DevUser};
use parley::chat::{ChatRepository, ChatService};
use parley::db::Database;
use parley::user::UserDirectory;

fn dev_user(id: &str, name: &str) -> DevUser {
    DevUser {
        id: id.to_string(),
        name: name.to_string(),
        email: format!("{id}@example.com"),
    }
}

/// Create a test AuthConfig with a JWT secret for testing.
fn test_auth_config() -> AuthConfig {
    AuthConfig {
        // Set a JWT secret for tests (required for token generation)
        jwt_secret: Some("test-secret-for-integration-tests-minimum-32-chars".to_string()),
        dev_mode: true,
        dev_users: vec![
            dev_user("dev", "Dev User"),
            dev_user("demo", "Demo User"),
            // Third account, never a participant in the conversations the
            // tests open between dev and demo
            dev_user("outsider", "Outsider"),
        ],
        ..AuthConfig::default()
    }
}

/// Create a test application with all services initialized.
///
/// Returns the router plus bearer tokens for the "dev" and "demo" users;
/// the "outsider" user is reachable through the X-Dev-User header.
pub async fn test_app() -> (Router, String, String) {
    // Use in-memory database for tests
    let db = Database::in_memory().await.unwrap();

    let auth_state = AuthState::new(test_auth_config());

    // Seed directory rows for the dev users so they can message each other
    let users = UserDirectory::new(db.pool().clone());
    for dev_user in auth_state.dev_users() {
        users.ensure(&dev_user.id, &dev_user.name).await.unwrap();
    }

    let token_a = auth_state
        .generate_dev_token(&auth_state.dev_users()[0])
        .unwrap();
    let token_b = auth_state
        .generate_dev_token(&auth_state.dev_users()[1])
        .unwrap();

    let chat = ChatService::new(ChatRepository::new(db.pool().clone()), users.clone());
    let state = api::AppState::new(chat, users, auth_state);

    (api::create_router(state), token_a, token_b)
}
