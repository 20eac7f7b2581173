//! Live relay integration tests over a real WebSocket connection.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

mod common;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve the test app on an ephemeral port.
async fn spawn_app() -> (SocketAddr, String, String) {
    let (router, token_a, token_b) = common::test_app().await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, token_a, token_b)
}

/// Open a relay connection; browsers pass the credential as a query
/// parameter on the upgrade request.
async fn connect(addr: SocketAddr, token: &str) -> WsStream {
    let url = format!("ws://{addr}/ws?token={token}");
    let (stream, _) = connect_async(url).await.unwrap();
    stream
}

/// Receive the next JSON event, skipping keepalive pings.
async fn recv_event(stream: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, stream.next())
            .await
            .expect("timed out waiting for event")
            .expect("connection closed")
            .expect("websocket error");

        if let tungstenite::Message::Text(text) = msg {
            let event: Value = serde_json::from_str(text.as_str()).unwrap();
            if event["type"] != "ping" {
                return event;
            }
        }
    }
}

async fn send_command(stream: &mut WsStream, command: Value) {
    stream
        .send(tungstenite::Message::Text(command.to_string().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_handshake_yields_connected_event() {
    let (addr, token_a, _) = spawn_app().await;

    let mut stream = connect(addr, &token_a).await;
    let event = recv_event(&mut stream).await;

    assert_eq!(event["type"], "connected");
    assert_eq!(event["user_id"], "dev");
}

#[tokio::test]
async fn test_unauthenticated_upgrade_refused() {
    let (addr, _, _) = spawn_app().await;

    let result = connect_async(format!("ws://{addr}/ws")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_token_upgrade_refused() {
    let (addr, _, _) = spawn_app().await;

    let result = connect_async(format!("ws://{addr}/ws?token=garbage")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401 rejection, got {other:?}"),
    }
}

/// A send reaches the recipient and every one of the sender's own tabs.
#[tokio::test]
async fn test_message_fans_out_to_recipient_and_sender_tabs() {
    let (addr, token_a, token_b) = spawn_app().await;

    let mut sender_tab1 = connect(addr, &token_a).await;
    let mut sender_tab2 = connect(addr, &token_a).await;
    let mut recipient_tab = connect(addr, &token_b).await;

    for stream in [&mut sender_tab1, &mut sender_tab2, &mut recipient_tab] {
        assert_eq!(recv_event(stream).await["type"], "connected");
    }

    send_command(
        &mut sender_tab1,
        json!({
            "type": "send_message",
            "recipient_id": "demo",
            "text": "hi from tab 1",
        }),
    )
    .await;

    for stream in [&mut sender_tab1, &mut sender_tab2, &mut recipient_tab] {
        let event = recv_event(stream).await;
        assert_eq!(event["type"], "message");
        assert_eq!(event["message"]["text"], "hi from tab 1");
        assert_eq!(event["message"]["sender"]["id"], "dev");
        assert!(event["message"]["conversation_id"].is_string());
    }
}

/// A rejected send is acknowledged to the issuing connection only.
#[tokio::test]
async fn test_whitespace_text_rejected_to_sender_only() {
    let (addr, token_a, token_b) = spawn_app().await;

    let mut sender_tab = connect(addr, &token_a).await;
    let mut recipient_tab = connect(addr, &token_b).await;
    assert_eq!(recv_event(&mut sender_tab).await["type"], "connected");
    assert_eq!(recv_event(&mut recipient_tab).await["type"], "connected");

    send_command(
        &mut sender_tab,
        json!({
            "type": "send_message",
            "recipient_id": "demo",
            "text": "   ",
            "client_ref": "optimistic-42",
        }),
    )
    .await;

    let event = recv_event(&mut sender_tab).await;
    assert_eq!(event["type"], "send_failed");
    assert_eq!(event["kind"], "validation");
    assert_eq!(event["client_ref"], "optimistic-42");

    // The recipient saw nothing; a follow-up valid send arrives first
    send_command(
        &mut sender_tab,
        json!({
            "type": "send_message",
            "recipient_id": "demo",
            "text": "real one",
        }),
    )
    .await;
    let event = recv_event(&mut recipient_tab).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["text"], "real one");
}

/// Malformed frames draw an error event but keep the connection open.
#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let (addr, token_a, _) = spawn_app().await;

    let mut stream = connect(addr, &token_a).await;
    assert_eq!(recv_event(&mut stream).await["type"], "connected");

    stream
        .send(tungstenite::Message::Text("not json".into()))
        .await
        .unwrap();
    let event = recv_event(&mut stream).await;
    assert_eq!(event["type"], "error");

    // Still usable afterwards
    send_command(
        &mut stream,
        json!({
            "type": "send_message",
            "recipient_id": "demo",
            "text": "still alive",
        }),
    )
    .await;
    let event = recv_event(&mut stream).await;
    assert_eq!(event["type"], "message");
    assert_eq!(event["message"]["text"], "still alive");
}
