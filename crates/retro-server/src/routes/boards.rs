//! Board creation and lookup.

use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use retro_core::{RetroError, run_blocking};
use retro_types::Board;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardResponse {
    pub board_id: String,
    pub admin_key: String,
}

/// Create a board with the default columns. The admin key is only ever
/// returned here.
pub async fn create(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<CreateBoardResponse>), (StatusCode, String)> {
    let board = Board::new_seeded();
    let saved = board.clone();
    run_blocking(&state.store, move |store| store.save(&saved)).await.map_err(|e| {
        error!(target: "retro::api", "Failed to save new board: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create board".to_string())
    })?;
    state.metrics.board_created();
    info!(target: "retro::api", "Created board {}", board.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateBoardResponse {
            board_id: board.id,
            admin_key: board.admin_key,
        }),
    ))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Board>, (StatusCode, String)> {
    let key = id.clone();
    match run_blocking(&state.store, move |store| store.get(&key)).await {
        Ok(board) => Ok(Json(board.redacted())),
        Err(RetroError::BoardNotFound(_)) => {
            Err((StatusCode::NOT_FOUND, "Board not found".to_string()))
        }
        Err(e) => {
            error!(target: "retro::api", "Failed to load board {}: {}", id, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
