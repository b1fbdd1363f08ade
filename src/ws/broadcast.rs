use super::{ConnectionId, ConnectionRegistry};
use crate::ws::protocol::ServerEvent;

/// Broadcast an event to every live connection, identified or not.
/// Deliberate simplification for single-instance deployments: presence
/// changes go to everyone rather than through an interest set.
pub fn broadcast_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    let Some(msg) = event.to_ws_message() else {
        return;
    };
    for entry in registry.iter() {
        let _ = entry.value().send(msg.clone());
    }
}

/// Deliver an event to a single connection. A missing or closed connection
/// means the event is dropped, never queued.
pub fn send_to_connection(
    registry: &ConnectionRegistry,
    connection_id: ConnectionId,
    event: &ServerEvent,
) {
    let Some(msg) = event.to_ws_message() else {
        return;
    };
    if let Some(sender) = registry.get(&connection_id) {
        let _ = sender.send(msg);
    }
}
