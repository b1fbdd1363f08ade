//! Persistence gateway for chat messages.
//!
//! Thin boundary over the message store: append-only writes plus a bulk
//! read-state update. The store is the only code that touches SQL; callers
//! treat it as an opaque durable append/update service.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbPool;

/// Failures surfaced by the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("message store unavailable")]
    Unavailable,
    #[error("message store error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A persisted chat message. Immutable once stored except for `is_read`,
/// which transitions false→true only, in bulk per conversation+receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub receiver_role: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: String,
}

/// Fields supplied by the sender; id, timestamp, and read state are
/// assigned by the store on append.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub receiver_id: String,
    pub receiver_name: String,
    pub receiver_role: String,
    pub message: String,
}

impl NewChatMessage {
    /// Required-field check: conversation id, both participant ids, and the
    /// message body must be present.
    fn validate(&self) -> Result<(), StoreError> {
        if self.conversation_id.is_empty() {
            return Err(StoreError::MissingField("conversation_id"));
        }
        if self.sender_id.is_empty() {
            return Err(StoreError::MissingField("sender_id"));
        }
        if self.receiver_id.is_empty() {
            return Err(StoreError::MissingField("receiver_id"));
        }
        if self.message.is_empty() {
            return Err(StoreError::MissingField("message"));
        }
        Ok(())
    }
}

/// Message store over the shared SQLite handle.
/// rusqlite is synchronous — all queries run on the blocking pool.
#[derive(Clone)]
pub struct ChatStore {
    db: DbPool,
}

impl ChatStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Persist a new message, assigning its id, creation timestamp, and
    /// `is_read = false`. Returns the full stored representation.
    pub async fn append(&self, new_message: NewChatMessage) -> Result<ChatMessage, StoreError> {
        new_message.validate()?;

        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Unavailable)?;

            let stored = ChatMessage {
                id: uuid::Uuid::now_v7().to_string(),
                conversation_id: new_message.conversation_id,
                sender_id: new_message.sender_id,
                sender_name: new_message.sender_name,
                sender_role: new_message.sender_role,
                receiver_id: new_message.receiver_id,
                receiver_name: new_message.receiver_name,
                receiver_role: new_message.receiver_role,
                message: new_message.message,
                is_read: false,
                created_at: Utc::now().to_rfc3339(),
            };

            conn.execute(
                "INSERT INTO chat_messages (id, conversation_id, sender_id, sender_name, sender_role,
                                            receiver_id, receiver_name, receiver_role, message, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    stored.id,
                    stored.conversation_id,
                    stored.sender_id,
                    stored.sender_name,
                    stored.sender_role,
                    stored.receiver_id,
                    stored.receiver_name,
                    stored.receiver_role,
                    stored.message,
                    stored.is_read,
                    stored.created_at,
                ],
            )?;

            Ok(stored)
        })
        .await
        .map_err(|_| StoreError::Unavailable)?
    }

    /// Flip all unread messages in a conversation addressed to `receiver_id`
    /// to read, as one bulk statement. Returns the number of rows affected
    /// (zero is not an error).
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        receiver_id: &str,
    ) -> Result<u64, StoreError> {
        let db = self.db.clone();
        let conversation_id = conversation_id.to_string();
        let receiver_id = receiver_id.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Unavailable)?;
            let affected = conn.execute(
                "UPDATE chat_messages SET is_read = 1
                 WHERE conversation_id = ?1 AND receiver_id = ?2 AND is_read = 0",
                rusqlite::params![conversation_id, receiver_id],
            )?;
            Ok(affected as u64)
        })
        .await
        .map_err(|_| StoreError::Unavailable)?
    }
}
