//! Live retro server library: HTTP routes, WebSocket sessions and shared state.
//!
//! Separate from main.rs so integration tests can build the router directly.

pub mod config;
pub mod logging;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod websocket;
