use std::sync::Arc;

use crate::db::DbPool;
use crate::relay::engine::RelayEngine;
use crate::relay::presence::PresenceDirectory;
use crate::relay::store::ChatStore;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Active WebSocket connections by connection id
    pub connections: ConnectionRegistry,
    /// The relay engine shared by all connection actors
    pub engine: Arc<RelayEngine>,
}

impl AppState {
    /// Wire up the relay from a database handle: store, presence directory,
    /// connection registry, and the engine composing them.
    pub fn new(db: DbPool) -> Self {
        let connections = crate::ws::new_connection_registry();
        let presence = Arc::new(PresenceDirectory::new());
        let store = ChatStore::new(db);
        let engine = Arc::new(RelayEngine::new(connections.clone(), presence, store));

        Self {
            connections,
            engine,
        }
    }
}
