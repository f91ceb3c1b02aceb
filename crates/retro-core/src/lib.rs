//! Real-time board synchronization engine: storage, hub, dispatch and expiry.

mod db;
mod dispatcher;
mod error;
mod hub;
mod metrics;
mod store;
mod sweeper;
pub mod validation;

pub use db::SqliteBoardStore;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::RetroError;
pub use hub::{encode, Hub, HubHandle, Outbound, SessionHandle, SessionInfo};
pub use metrics::{Metrics, MetricsSnapshot};
pub use store::{board_key, run_blocking, BoardStore, MemoryBoardStore, DEFAULT_BOARD_TTL};
pub use sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL};

/// Result type for board engine operations.
pub type Result<T> = std::result::Result<T, RetroError>;
