//! WebSocket handler for client connections.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;

use crate::api::{ApiError, AppState};
use crate::auth::{AuthError, CurrentUser};
use crate::chat::NewMessage;

use super::registry::{ConnectionRegistry, WsSender};
use super::types::{ClientCommand, ServerEvent};

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Size of the per-connection send buffer.
const CONNECTION_BUFFER_SIZE: usize = 64;

/// WebSocket upgrade handler.
///
/// GET /ws
///
/// The credential travels on the upgrade request itself and is verified
/// by the auth middleware before this handler runs; an unauthenticated
/// connection is refused without ever touching the registry. The
/// directory mirror below is the only verification step that can block,
/// so it is bounded by the handshake timeout.
pub async fn ws_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let user_id = user.id().to_string();

    let ensure = state.users.ensure(user.id(), user.display_name());
    match tokio::time::timeout(state.auth.handshake_timeout(), ensure).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => {
            error!("User lookup failed during handshake for {}: {:?}", user_id, err);
            return Err(ApiError::internal("credential verification failed"));
        }
        Err(_) => {
            warn!("Handshake verification timed out for user {}", user_id);
            return Err(ApiError::unauthorized(
                AuthError::HandshakeTimeout.to_string(),
            ));
        }
    }

    info!("WebSocket upgrade request from user {}", user_id);
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, state, user_id)))
}

/// Handle an authenticated WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (mut sender, mut receiver) = socket.split();

    // Register connection with the registry
    let (conn_tx, mut conn_rx) = tokio::sync::mpsc::channel(CONNECTION_BUFFER_SIZE);
    let conn_id = state.registry.next_conn_id();
    state.registry.register(&user_id, conn_id, conn_tx.clone());

    // Send connected message
    let connected = ServerEvent::Connected {
        user_id: user_id.clone(),
    };
    if let Err(e) = send_event(&mut sender, &connected).await {
        error!("Failed to send connected message to user {}: {}", user_id, e);
        state.registry.unregister(&user_id, conn_id);
        return;
    }

    // Spawn task to pump events to the client
    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
        // The first tick fires immediately; the connected event just went out
        ping_interval.tick().await;

        loop {
            tokio::select! {
                // Events from the per-connection channel
                maybe_event = conn_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            if send_event(&mut sender, &event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                // Periodic ping
                _ = ping_interval.tick() => {
                    if send_event(&mut sender, &ServerEvent::Ping).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Process incoming messages
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(cmd) => handle_command(&state, &user_id, cmd, &conn_tx).await,
                Err(e) => {
                    warn!("Failed to parse command from user {}: {}", user_id, e);
                    let _ = conn_tx
                        .send(ServerEvent::Error {
                            message: format!("unrecognized command: {e}"),
                        })
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                // Binary frames are not part of the protocol
                debug!("Received binary message from user {}, ignoring", user_id);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Received ping/pong from user {}", user_id);
            }
            Ok(Message::Close(_)) => {
                info!("User {} closed WebSocket connection", user_id);
                break;
            }
            Err(e) => {
                warn!("WebSocket error for user {}: {}", user_id, e);
                break;
            }
        }
    }

    // Clean up
    send_task.abort();
    state.registry.unregister(&user_id, conn_id);
    info!("WebSocket connection closed for user {}", user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

/// Handle a command from a client.
async fn handle_command(state: &AppState, user_id: &str, cmd: ClientCommand, conn_tx: &WsSender) {
    match cmd {
        ClientCommand::Pong => {
            // Pong received, connection is alive
        }

        ClientCommand::SendMessage {
            conversation_id,
            recipient_id,
            text,
            client_ref,
        } => {
            let request = NewMessage {
                conversation_id,
                recipient_id,
                text,
            };
            relay_send(state, user_id, request, client_ref, conn_tx).await;
        }
    }
}

/// Persist a send request and fan the result out to live connections.
///
/// Failures are acknowledged to the issuing connection only; the
/// connection stays open. Nothing is pushed unless the store write
/// succeeded.
async fn relay_send(
    state: &AppState,
    sender_id: &str,
    request: NewMessage,
    client_ref: Option<String>,
    conn_tx: &WsSender,
) {
    match state.chat.send_message(sender_id, request).await {
        Ok(outcome) => {
            let event = ServerEvent::Message {
                message: outcome.message,
            };
            // Recipient's live connections, then the sender's own tabs
            // (multi-tab echo). An empty snapshot means offline, which is
            // the normal case covered by history catch-up.
            deliver_to_user(&state.registry, &outcome.recipient_id, &event).await;
            deliver_to_user(&state.registry, sender_id, &event).await;
        }
        Err(err) => {
            if err.is_validation() {
                warn!("Rejected send from user {}: {}", sender_id, err);
            } else {
                error!("Send from user {} failed to persist: {}", sender_id, err);
            }
            let _ = conn_tx
                .send(ServerEvent::SendFailed {
                    kind: (&err).into(),
                    message: err.to_string(),
                    client_ref,
                })
                .await;
        }
    }
}

/// Push an event to every connection in the registry's snapshot for a
/// user. A push that fails at transport level is dropped: the message is
/// already durable, so that client reconciles via the history API.
async fn deliver_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) {
    for sender in registry.connections_for(user_id) {
        if sender.send(event.clone()).await.is_err() {
            debug!("Dropped live push to user {}: connection closed", user_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, AuthState};
    use crate::chat::{ChatRepository, ChatService};
    use crate::db::Database;
    use crate::user::UserDirectory;
    use crate::ws::types::SendFailureKind;
    use tokio::sync::mpsc;

    async fn test_state() -> AppState {
        let db = Database::in_memory().await.unwrap();
        let users = UserDirectory::new(db.pool().clone());
        users.ensure("usr_alice", "Alice").await.unwrap();
        users.ensure("usr_bob", "Bob").await.unwrap();

        let chat = ChatService::new(ChatRepository::new(db.pool().clone()), users.clone());
        let auth = AuthState::new(AuthConfig {
            dev_mode: true,
            ..AuthConfig::default()
        });
        AppState::new(chat, users, auth)
    }

    fn send_cmd(recipient: &str, text: &str) -> NewMessage {
        NewMessage {
            conversation_id: None,
            recipient_id: Some(recipient.to_string()),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_fans_out_to_all_tabs_and_recipient() {
        let state = test_state().await;

        // Alice has two tabs, Bob one
        let (alice_tab1, mut alice_rx1) = mpsc::channel(8);
        let (alice_tab2, mut alice_rx2) = mpsc::channel(8);
        let (bob_tab, mut bob_rx) = mpsc::channel(8);
        state
            .registry
            .register("usr_alice", state.registry.next_conn_id(), alice_tab1);
        state
            .registry
            .register("usr_alice", state.registry.next_conn_id(), alice_tab2);
        state
            .registry
            .register("usr_bob", state.registry.next_conn_id(), bob_tab);

        let (issuing_tx, _issuing_rx) = mpsc::channel(8);
        relay_send(
            &state,
            "usr_alice",
            send_cmd("usr_bob", "hi"),
            None,
            &issuing_tx,
        )
        .await;

        for rx in [&mut alice_rx1, &mut alice_rx2, &mut bob_rx] {
            match rx.recv().await {
                Some(ServerEvent::Message { message }) => {
                    assert_eq!(message.text, "hi");
                    assert_eq!(message.sender.display_name, "Alice");
                }
                other => panic!("expected message event, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_offline_recipient_pushes_to_no_one_but_persists() {
        let state = test_state().await;

        let (issuing_tx, mut issuing_rx) = mpsc::channel(8);
        relay_send(
            &state,
            "usr_alice",
            send_cmd("usr_bob", "hello"),
            None,
            &issuing_tx,
        )
        .await;

        // No failure ack: the send succeeded even with zero live
        // connections anywhere
        drop(issuing_tx);
        assert!(issuing_rx.recv().await.is_none());

        let messages = {
            let conversations = state.chat.conversations_for("usr_bob").await.unwrap();
            state
                .chat
                .messages_for("usr_bob", &conversations[0].id)
                .await
                .unwrap()
        };
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
    }

    #[tokio::test]
    async fn test_rejected_send_acks_issuing_connection_only() {
        let state = test_state().await;

        let (bob_tab, mut bob_rx) = mpsc::channel(8);
        state
            .registry
            .register("usr_bob", state.registry.next_conn_id(), bob_tab);

        let (issuing_tx, mut issuing_rx) = mpsc::channel(8);
        relay_send(
            &state,
            "usr_alice",
            send_cmd("usr_bob", "   "),
            Some("ref-1".to_string()),
            &issuing_tx,
        )
        .await;

        match issuing_rx.recv().await {
            Some(ServerEvent::SendFailed {
                kind, client_ref, ..
            }) => {
                assert_eq!(kind, SendFailureKind::Validation);
                assert_eq!(client_ref.as_deref(), Some("ref-1"));
            }
            other => panic!("expected send_failed event, got {other:?}"),
        }

        // Bob saw nothing
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_connection_does_not_block_others() {
        let state = test_state().await;

        let (dead_tab, dead_rx) = mpsc::channel(8);
        drop(dead_rx);
        let (live_tab, mut live_rx) = mpsc::channel(8);
        state
            .registry
            .register("usr_bob", state.registry.next_conn_id(), dead_tab);
        state
            .registry
            .register("usr_bob", state.registry.next_conn_id(), live_tab);

        let (issuing_tx, _issuing_rx) = mpsc::channel(8);
        relay_send(
            &state,
            "usr_alice",
            send_cmd("usr_bob", "hi"),
            None,
            &issuing_tx,
        )
        .await;

        // The push to the dead socket is dropped; the live one still gets it
        assert!(matches!(
            live_rx.recv().await,
            Some(ServerEvent::Message { .. })
        ));
    }
}
