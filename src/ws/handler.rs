use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};

use crate::state::AppState;
use crate::ws::actor;

/// GET /ws
/// WebSocket upgrade endpoint. Connections start anonymous; identity is
/// established by the first join event on the socket.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Handle an upgraded WebSocket connection by running the actor.
async fn handle_connection(socket: WebSocket, state: AppState) {
    actor::run_connection(socket, state).await;
}
