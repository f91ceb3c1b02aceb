//! Shared types for the Live Retro board server.

mod board;
mod ws;

pub use board::*;
pub use ws::*;
