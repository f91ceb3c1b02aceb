//! Error types for the board engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetroError {
    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    StorePoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),

    #[error("Hub is not running")]
    HubUnavailable,
}
