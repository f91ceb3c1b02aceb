//! WebSocket route handler.

use crate::state::AppState;
use crate::websocket::handle_websocket;
use axum::{
    extract::{
        Query, State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub board_id: Option<String>,
    pub admin_key: Option<String>,
}

pub async fn upgrade(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(board_id) = params.board_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "boardId is required").into_response();
    };
    let admin_key = params.admin_key.filter(|key| !key.is_empty());
    let max_size = state.config.max_message_size;

    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_connection(socket, state, board_id, admin_key))
}

async fn handle_connection(
    socket: WebSocket,
    state: Arc<AppState>,
    board_id: String,
    admin_key: Option<String>,
) {
    if let Err(e) = handle_websocket(socket, state, board_id.clone(), admin_key).await {
        tracing::error!(target: "retro::ws", "WebSocket error for board {}: {}", board_id, e);
    }
}
