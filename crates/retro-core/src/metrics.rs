//! Process counters, constructed once and shared by `Arc`.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct Metrics {
    started: Instant,
    active_connections: AtomicI64,
    total_connections: AtomicU64,
    boards_created: AtomicU64,
    boards_expired: AtomicU64,
    messages_processed: AtomicU64,
    message_errors: AtomicU64,
    broadcasts: AtomicU64,
    dropped_sessions: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub active_connections: i64,
    pub total_connections: u64,
    pub boards_created: u64,
    pub boards_expired: u64,
    pub messages_processed: u64,
    pub message_errors: u64,
    pub broadcasts: u64,
    pub dropped_sessions: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            active_connections: AtomicI64::new(0),
            total_connections: AtomicU64::new(0),
            boards_created: AtomicU64::new(0),
            boards_expired: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
            message_errors: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            dropped_sessions: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn board_created(&self) {
        self.boards_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn board_expired(&self) {
        self.boards_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_error(&self) {
        self.message_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_dropped(&self) {
        self.dropped_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            boards_created: self.boards_created.load(Ordering::Relaxed),
            boards_expired: self.boards_expired.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            message_errors: self.message_errors.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            dropped_sessions: self.dropped_sessions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = Metrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.active_connections, 1);
        assert_eq!(snap.total_connections, 2);
        assert_eq!(snap.broadcasts, 0);
    }
}
