//! Integration tests for the realtime relay: join/presence broadcast,
//! message delivery, typing indicators, read receipts, and disconnect
//! fan-out. Boots the real server on an ephemeral port and drives it with
//! WebSocket clients.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the relay on a random port with a tempdir-backed database.
async fn start_test_server() -> SocketAddr {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = telecare_relay::db::init_db(&data_dir).expect("Failed to init DB");
    let state = telecare_relay::state::AppState::new(db);
    let app = telecare_relay::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    addr
}

async fn connect(addr: SocketAddr) -> WsStream {
    let ws_url = format!("ws://{}/ws", addr);
    let (stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    stream
}

async fn send_event(ws: &mut WsStream, event: Value) {
    ws.send(Message::Text(event.to_string().into()))
        .await
        .expect("Failed to send event");
}

/// Read frames until an event of the given type arrives, skipping other
/// events (presence chatter from concurrent connections). Panics on timeout.
async fn expect_event(ws: &mut WsStream, event_type: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {event_type}"))
            .expect("Stream ended while waiting for event")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).expect("Invalid JSON frame");
            if value["type"] == event_type {
                return value;
            }
        }
    }
}

/// Assert that no text frame arrives within a short window.
async fn expect_silence(ws: &mut WsStream) {
    match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Text(text)))) => panic!("Expected no event, got: {}", text),
        Ok(_) => {}
    }
}

/// Join as a user and wait for the server's snapshot, which confirms the
/// join was fully processed (presence recorded, broadcast done).
async fn join(ws: &mut WsStream, user_id: &str) -> Value {
    send_event(ws, json!({"type": "join", "user_id": user_id})).await;
    expect_event(ws, "online_users").await
}

fn send_message_event(sender_id: &str, receiver_id: &str, message: &str) -> Value {
    json!({
        "type": "send_message",
        "sender_id": sender_id,
        "sender_name": "Pat Patient",
        "sender_role": "patient",
        "receiver_id": receiver_id,
        "receiver_name": "Dr. Doc",
        "receiver_role": "doctor",
        "message": message,
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_test_server().await;

    let resp = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("Health request failed");
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_join_broadcasts_online_and_snapshots() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    send_event(&mut a, json!({"type": "join", "user_id": "u1"})).await;

    // The joiner sees its own user_online broadcast, then the snapshot.
    let online = expect_event(&mut a, "user_online").await;
    assert_eq!(online["user_id"], "u1");
    let snapshot = expect_event(&mut a, "online_users").await;
    assert!(snapshot["user_ids"].as_array().unwrap().iter().any(|v| v == "u1"));

    // A second join is broadcast to the first connection too.
    let mut b = connect(addr).await;
    let snapshot = join(&mut b, "u2").await;
    let user_ids = snapshot["user_ids"].as_array().unwrap();
    assert!(user_ids.iter().any(|v| v == "u1"));
    assert!(user_ids.iter().any(|v| v == "u2"));

    let online = expect_event(&mut a, "user_online").await;
    assert_eq!(online["user_id"], "u2");
}

#[tokio::test]
async fn test_message_delivery_end_to_end() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;

    // Wait until A has seen u2 come online so the send cannot race the join.
    let online = expect_event(&mut a, "user_online").await;
    assert_eq!(online["user_id"], "u2");

    send_event(&mut a, send_message_event("u1", "u2", "hello")).await;

    let received = expect_event(&mut b, "receive_message").await;
    assert_eq!(received["message"]["message"], "hello");
    assert_eq!(received["message"]["conversation_id"], "u1_u2");
    assert_eq!(received["message"]["is_read"], false);

    let confirmed = expect_event(&mut a, "message_sent").await;
    assert_eq!(confirmed["message"]["id"], received["message"]["id"]);
}

#[tokio::test]
async fn test_offline_receiver_still_persists_and_confirms() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;

    // u2 never joined: message is persisted and confirmed, nothing delivered.
    send_event(&mut a, send_message_event("u1", "u2", "are you there?")).await;
    let confirmed = expect_event(&mut a, "message_sent").await;
    assert_eq!(confirmed["message"]["message"], "are you there?");
    expect_silence(&mut a).await;

    // A late join does not retroactively deliver the message.
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_mark_read_notifies_sender() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;
    expect_event(&mut a, "user_online").await;

    send_event(&mut a, send_message_event("u1", "u2", "hello")).await;
    expect_event(&mut b, "receive_message").await;
    expect_event(&mut a, "message_sent").await;

    // B acknowledges the conversation; the sender gets the read receipt.
    send_event(
        &mut b,
        json!({"type": "mark_read", "conversation_id": "u1_u2", "receiver_id": "u2"}),
    )
    .await;
    let receipt = expect_event(&mut a, "messages_read").await;
    assert_eq!(receipt["conversation_id"], "u1_u2");

    // Acknowledging again (zero unread rows) still confirms.
    send_event(
        &mut b,
        json!({"type": "mark_read", "conversation_id": "u1_u2", "receiver_id": "u2"}),
    )
    .await;
    let receipt = expect_event(&mut a, "messages_read").await;
    assert_eq!(receipt["conversation_id"], "u1_u2");
}

#[tokio::test]
async fn test_typing_indicators_forwarded() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;
    expect_event(&mut a, "user_online").await;

    send_event(
        &mut a,
        json!({"type": "typing", "sender_id": "u1", "receiver_id": "u2"}),
    )
    .await;
    let indicator = expect_event(&mut b, "typing_indicator").await;
    assert_eq!(indicator["user_id"], "u1");

    send_event(
        &mut a,
        json!({"type": "stop_typing", "sender_id": "u1", "receiver_id": "u2"}),
    )
    .await;
    let indicator = expect_event(&mut b, "stop_typing_indicator").await;
    assert_eq!(indicator["user_id"], "u1");
}

#[tokio::test]
async fn test_typing_to_offline_receiver_is_dropped() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;

    send_event(
        &mut a,
        json!({"type": "typing", "sender_id": "u1", "receiver_id": "ghost"}),
    )
    .await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn test_disconnect_broadcasts_offline() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;

    a.send(Message::Close(None)).await.expect("Failed to close");

    let offline = expect_event(&mut b, "user_offline").await;
    assert_eq!(offline["user_id"], "u1");
}

#[tokio::test]
async fn test_rejoin_last_wins() {
    let addr = start_test_server().await;

    // u1 joins twice from different connections: the second wins.
    let mut stale = connect(addr).await;
    join(&mut stale, "u1").await;
    let mut fresh = connect(addr).await;
    join(&mut fresh, "u1").await;
    expect_event(&mut stale, "user_online").await;

    let mut b = connect(addr).await;
    join(&mut b, "u2").await;
    expect_event(&mut fresh, "user_online").await;
    expect_event(&mut stale, "user_online").await;

    send_event(&mut b, send_message_event("u2", "u1", "ping")).await;
    let received = expect_event(&mut fresh, "receive_message").await;
    assert_eq!(received["message"]["message"], "ping");
    expect_event(&mut b, "message_sent").await;
    expect_silence(&mut stale).await;

    // Closing the superseded connection must not take u1 offline.
    stale.send(Message::Close(None)).await.expect("Failed to close");
    expect_silence(&mut b).await;
}

#[tokio::test]
async fn test_rebind_to_new_identity_releases_old_user() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    join(&mut a, "u1").await;
    let mut b = connect(addr).await;
    join(&mut b, "u2").await;
    expect_event(&mut a, "user_online").await;

    // A re-joins as u3 on the same connection: u1 goes offline for
    // everyone before u3 comes online.
    send_event(&mut a, json!({"type": "join", "user_id": "u3"})).await;
    let offline = expect_event(&mut b, "user_offline").await;
    assert_eq!(offline["user_id"], "u1");
    let online = expect_event(&mut b, "user_online").await;
    assert_eq!(online["user_id"], "u3");

    let snapshot = expect_event(&mut a, "online_users").await;
    let user_ids = snapshot["user_ids"].as_array().unwrap();
    assert!(!user_ids.iter().any(|v| v == "u1"));
    assert!(user_ids.iter().any(|v| v == "u3"));
}

#[tokio::test]
async fn test_anonymous_events_are_dropped() {
    let addr = start_test_server().await;

    // No join: send_message and typing are no-ops, nothing comes back.
    let mut a = connect(addr).await;
    send_event(&mut a, send_message_event("u1", "u2", "hello")).await;
    send_event(
        &mut a,
        json!({"type": "typing", "sender_id": "u1", "receiver_id": "u2"}),
    )
    .await;
    expect_silence(&mut a).await;
}

#[tokio::test]
async fn test_malformed_frame_gets_error() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    a.send(Message::Text("not json".into()))
        .await
        .expect("Failed to send");

    let error = expect_event(&mut a, "message_error").await;
    assert!(error["error"].as_str().unwrap().contains("Invalid"));
}

#[tokio::test]
async fn test_join_with_invalid_user_id_rejected() {
    let addr = start_test_server().await;

    let mut a = connect(addr).await;
    send_event(&mut a, json!({"type": "join", "user_id": ""})).await;
    send_event(&mut a, json!({"type": "join", "user_id": "bad_id"})).await;
    expect_silence(&mut a).await;
}
