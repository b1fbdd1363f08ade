//! Connection-event dispatcher: join, send, typing, read-receipt,
//! disconnect. Composes the presence directory and the message store to
//! decide fan-out targets.

use std::sync::Arc;

use crate::relay::conversation;
use crate::relay::presence::PresenceDirectory;
use crate::relay::store::{ChatStore, NewChatMessage};
use crate::ws::broadcast::{broadcast_to_all, send_to_connection};
use crate::ws::protocol::ServerEvent;
use crate::ws::{ConnectionId, ConnectionRegistry};

/// Lifecycle of a single connection as seen by the relay.
/// Anonymous until a join binds a user id; Closed is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Anonymous,
    Identified(String),
    Closed,
}

/// Payload of a send_message event, as supplied by the sender.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub receiver_role: String,
    pub message: String,
}

/// The relay engine. One instance per server, shared by all connection
/// actors; per-connection state lives with the actor and is passed in.
///
/// Presence mutations are synchronous and never suspend, so no handler can
/// observe a half-updated directory. The store calls in `handle_send` and
/// `handle_mark_read` are the only suspension points.
pub struct RelayEngine {
    connections: ConnectionRegistry,
    presence: Arc<PresenceDirectory>,
    store: ChatStore,
}

impl RelayEngine {
    pub fn new(
        connections: ConnectionRegistry,
        presence: Arc<PresenceDirectory>,
        store: ChatStore,
    ) -> Self {
        Self {
            connections,
            presence,
            store,
        }
    }

    /// Bind a user id to this connection, record presence (last join wins),
    /// broadcast user_online to everyone, and send the joiner a snapshot of
    /// who is currently online.
    pub fn handle_join(
        &self,
        connection_id: ConnectionId,
        conn_state: &mut ConnectionState,
        user_id: &str,
    ) {
        if *conn_state == ConnectionState::Closed {
            return;
        }
        if !conversation::valid_user_id(user_id) {
            tracing::warn!(
                connection_id = connection_id,
                user_id = %user_id,
                "Rejected join with invalid user id"
            );
            return;
        }

        // A repeated join rebinds the connection: drop whatever presence
        // entry this connection currently owns before recording the new
        // one, and tell everyone when an abandoned identity goes offline.
        if matches!(conn_state, ConnectionState::Identified(_)) {
            if let Some(previous) = self.presence.remove_by_connection(connection_id) {
                if previous != user_id {
                    broadcast_to_all(
                        &self.connections,
                        &ServerEvent::UserOffline { user_id: previous },
                    );
                }
            }
        }

        self.presence.set_online(user_id, connection_id);
        *conn_state = ConnectionState::Identified(user_id.to_string());

        tracing::info!(
            connection_id = connection_id,
            user_id = %user_id,
            "User joined"
        );

        broadcast_to_all(
            &self.connections,
            &ServerEvent::UserOnline {
                user_id: user_id.to_string(),
            },
        );

        send_to_connection(
            &self.connections,
            connection_id,
            &ServerEvent::OnlineUsers {
                user_ids: self.presence.online_users(),
            },
        );
    }

    /// Persist a message and fan it out: receive_message to the receiver's
    /// connection if they are online, message_sent back to the sender
    /// unconditionally. On persistence failure the sender alone gets a
    /// message_error; there is no retry.
    pub async fn handle_send(
        &self,
        connection_id: ConnectionId,
        conn_state: &ConnectionState,
        request: SendRequest,
    ) {
        if !matches!(conn_state, ConnectionState::Identified(_)) {
            tracing::trace!(
                connection_id = connection_id,
                "Dropping send_message from unidentified connection"
            );
            return;
        }

        if !conversation::valid_user_id(&request.sender_id)
            || !conversation::valid_user_id(&request.receiver_id)
        {
            self.emit_error(connection_id, "Invalid sender or receiver id");
            return;
        }

        let conversation_id = conversation::conversation_key(&request.sender_id, &request.receiver_id);
        let receiver_id = request.receiver_id.clone();

        let new_message = NewChatMessage {
            conversation_id,
            sender_id: request.sender_id,
            sender_name: request.sender_name,
            sender_role: request.sender_role,
            receiver_id: request.receiver_id,
            receiver_name: request.receiver_name,
            receiver_role: request.receiver_role,
            message: request.message,
        };

        match self.store.append(new_message).await {
            Ok(stored) => {
                if let Some(receiver_conn) = self.presence.lookup(&receiver_id) {
                    send_to_connection(
                        &self.connections,
                        receiver_conn,
                        &ServerEvent::ReceiveMessage {
                            message: stored.clone(),
                        },
                    );
                }
                send_to_connection(
                    &self.connections,
                    connection_id,
                    &ServerEvent::MessageSent { message: stored },
                );
            }
            Err(e) => {
                tracing::error!(
                    connection_id = connection_id,
                    error = %e,
                    "Failed to persist message"
                );
                self.emit_error(connection_id, &e.to_string());
            }
        }
    }

    /// Forward a typing indicator to the receiver if online. No
    /// persistence; dropped silently when the receiver is offline.
    pub fn handle_typing(&self, conn_state: &ConnectionState, sender_id: &str, receiver_id: &str) {
        self.forward_indicator(conn_state, sender_id, receiver_id, false);
    }

    pub fn handle_stop_typing(
        &self,
        conn_state: &ConnectionState,
        sender_id: &str,
        receiver_id: &str,
    ) {
        self.forward_indicator(conn_state, sender_id, receiver_id, true);
    }

    fn forward_indicator(
        &self,
        conn_state: &ConnectionState,
        sender_id: &str,
        receiver_id: &str,
        stopped: bool,
    ) {
        if !matches!(conn_state, ConnectionState::Identified(_)) {
            return;
        }
        let Some(receiver_conn) = self.presence.lookup(receiver_id) else {
            return;
        };
        let user_id = sender_id.to_string();
        let event = if stopped {
            ServerEvent::StopTypingIndicator { user_id }
        } else {
            ServerEvent::TypingIndicator { user_id }
        };
        send_to_connection(&self.connections, receiver_conn, &event);
    }

    /// Bulk-mark a conversation's messages as read for the acknowledging
    /// receiver, then notify the counterpart if they are online. The
    /// confirmation is emitted on success even when zero rows changed.
    /// Failures are logged and surfaced to no one (best-effort receipts).
    pub async fn handle_mark_read(
        &self,
        conn_state: &ConnectionState,
        conversation_id: &str,
        receiver_id: &str,
    ) {
        if !matches!(conn_state, ConnectionState::Identified(_)) {
            return;
        }

        match self.store.mark_read(conversation_id, receiver_id).await {
            Ok(affected) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    receiver_id = %receiver_id,
                    affected = affected,
                    "Marked conversation read"
                );

                let Some(sender_id) = conversation::counterpart(conversation_id, receiver_id)
                else {
                    tracing::warn!(
                        conversation_id = %conversation_id,
                        receiver_id = %receiver_id,
                        "Cannot derive counterpart from conversation id"
                    );
                    return;
                };

                if let Some(sender_conn) = self.presence.lookup(sender_id) {
                    send_to_connection(
                        &self.connections,
                        sender_conn,
                        &ServerEvent::MessagesRead {
                            conversation_id: conversation_id.to_string(),
                        },
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    receiver_id = %receiver_id,
                    error = %e,
                    "Failed to mark conversation read"
                );
            }
        }
    }

    /// Tear down a connection: remove its presence entry and, if a user was
    /// bound, broadcast user_offline to everyone remaining. Idempotent.
    pub fn handle_disconnect(&self, connection_id: ConnectionId, conn_state: &mut ConnectionState) {
        if *conn_state == ConnectionState::Closed {
            return;
        }
        *conn_state = ConnectionState::Closed;

        if let Some(user_id) = self.presence.remove_by_connection(connection_id) {
            tracing::info!(
                connection_id = connection_id,
                user_id = %user_id,
                "User went offline"
            );
            broadcast_to_all(&self.connections, &ServerEvent::UserOffline { user_id });
        }
    }

    fn emit_error(&self, connection_id: ConnectionId, description: &str) {
        send_to_connection(
            &self.connections,
            connection_id,
            &ServerEvent::MessageError {
                error: description.to_string(),
            },
        );
    }
}
