//! The relay's JSON event surface: tagged envelopes over WebSocket text
//! frames, `{"type": "...", ...fields}` in both directions.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::relay::engine::{ConnectionState, RelayEngine, SendRequest};
use crate::relay::store::ChatMessage;
use crate::ws::{ConnectionId, ConnectionSender};

/// Events a client may send to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    Join {
        user_id: String,
    },
    SendMessage {
        sender_id: String,
        sender_name: String,
        sender_role: String,
        receiver_id: String,
        receiver_name: String,
        receiver_role: String,
        message: String,
    },
    Typing {
        sender_id: String,
        receiver_id: String,
    },
    StopTyping {
        sender_id: String,
        receiver_id: String,
    },
    MarkRead {
        conversation_id: String,
        receiver_id: String,
    },
}

/// Events the relay delivers to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Broadcast to all connections when a user joins.
    UserOnline { user_id: String },
    /// Broadcast to all connections when a user's connection goes away.
    UserOffline { user_id: String },
    /// Snapshot of currently online users, sent to a connection right
    /// after its own join.
    OnlineUsers { user_ids: Vec<String> },
    /// Targeted delivery of a freshly persisted message to its receiver.
    ReceiveMessage { message: ChatMessage },
    /// Confirmation of the persisted message back to its sender.
    MessageSent { message: ChatMessage },
    /// Targeted typing indicator carrying the typing user's id.
    TypingIndicator { user_id: String },
    StopTypingIndicator { user_id: String },
    /// Read receipt: all messages in the conversation addressed to the
    /// acknowledging receiver are now read.
    MessagesRead { conversation_id: String },
    /// Best-effort failure report, targeted to the event's sender.
    MessageError { error: String },
}

impl ServerEvent {
    /// Encode as a WebSocket text frame. Serialization of these enums
    /// cannot fail; `None` is returned only to keep callers panic-free.
    pub fn to_ws_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|json| Message::Text(json.into()))
    }
}

/// Handle an incoming text frame: decode the tagged event and dispatch it
/// to the relay engine. Malformed frames get a targeted error event.
pub async fn handle_text_message(
    text: &str,
    connection_id: ConnectionId,
    conn_state: &mut ConnectionState,
    engine: &RelayEngine,
    tx: &ConnectionSender,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                connection_id = connection_id,
                error = %e,
                "Failed to decode client event"
            );
            send_error(tx, "Invalid event payload");
            return;
        }
    };

    match event {
        ClientEvent::Join { user_id } => {
            engine.handle_join(connection_id, conn_state, &user_id);
        }
        ClientEvent::SendMessage {
            sender_id,
            sender_name,
            sender_role,
            receiver_id,
            receiver_name,
            receiver_role,
            message,
        } => {
            engine
                .handle_send(
                    connection_id,
                    conn_state,
                    SendRequest {
                        sender_id,
                        sender_name,
                        sender_role,
                        receiver_id,
                        receiver_name,
                        receiver_role,
                        message,
                    },
                )
                .await;
        }
        ClientEvent::Typing {
            sender_id,
            receiver_id,
        } => {
            engine.handle_typing(conn_state, &sender_id, &receiver_id);
        }
        ClientEvent::StopTyping {
            sender_id,
            receiver_id,
        } => {
            engine.handle_stop_typing(conn_state, &sender_id, &receiver_id);
        }
        ClientEvent::MarkRead {
            conversation_id,
            receiver_id,
        } => {
            engine
                .handle_mark_read(conn_state, &conversation_id, &receiver_id)
                .await;
        }
    }
}

/// Send a MessageError event directly on a connection's channel.
fn send_error(tx: &ConnectionSender, description: &str) {
    let event = ServerEvent::MessageError {
        error: description.to_string(),
    };
    if let Some(msg) = event.to_ws_message() {
        let _ = tx.send(msg);
    }
}
