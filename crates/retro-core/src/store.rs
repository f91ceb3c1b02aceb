//! Keyed, TTL-bearing board persistence.

use crate::{Result, RetroError};
use dashmap::DashMap;
use retro_types::Board;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Default lifetime of a board after its last save.
pub const DEFAULT_BOARD_TTL: Duration = Duration::from_secs(30 * 60);

/// Storage key for a board id.
pub fn board_key(board_id: &str) -> String {
    format!("board:{}", board_id)
}

/// Durable board storage.
///
/// Implementations must be safe for concurrent use. Every `save` refreshes the
/// board's TTL; once the TTL lapses the board behaves as if deleted.
/// There is no compare-and-swap: concurrent writers overwrite each other.
pub trait BoardStore: Send + Sync {
    fn get(&self, board_id: &str) -> Result<Board>;
    fn save(&self, board: &Board) -> Result<()>;
    /// Whether a live board is stored. Errors mean "unknown", not "absent".
    fn exists(&self, board_id: &str) -> Result<bool>;
    fn delete(&self, board_id: &str) -> Result<()>;
    /// Drop every expired board. Returns how many were removed.
    fn purge_expired(&self) -> Result<usize>;
}

/// Run a store call on the blocking thread pool so disk-backed stores never
/// stall a runtime worker.
pub async fn run_blocking<T, F>(store: &Arc<dyn BoardStore>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn BoardStore) -> Result<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(store.as_ref())).await?
}

struct Entry {
    data: String,
    expires_at: Instant,
}

/// In-process store holding serialized boards.
///
/// Values are kept as JSON so readers always get an independent copy, the same
/// as an external blob store would hand out.
pub struct MemoryBoardStore {
    entries: DashMap<String, Entry>,
    ttl: Duration,
}

impl Default for MemoryBoardStore {
    fn default() -> Self {
        Self::new(DEFAULT_BOARD_TTL)
    }
}

impl MemoryBoardStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch the raw entry, evicting it if expired.
    fn live_data(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            trace!(target: "retro::store", "Evicting expired {}", key);
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        }
        None
    }
}

impl BoardStore for MemoryBoardStore {
    fn get(&self, board_id: &str) -> Result<Board> {
        let data = self
            .live_data(&board_key(board_id))
            .ok_or_else(|| RetroError::BoardNotFound(board_id.to_string()))?;
        Ok(serde_json::from_str(&data)?)
    }

    fn save(&self, board: &Board) -> Result<()> {
        let data = serde_json::to_string(board)?;
        self.entries.insert(
            board_key(&board.id),
            Entry {
                data,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    fn exists(&self, board_id: &str) -> Result<bool> {
        Ok(self.live_data(&board_key(board_id)).is_some())
    }

    fn delete(&self, board_id: &str) -> Result<()> {
        self.entries.remove(&board_key(board_id));
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(target: "retro::store", "Purged {} expired boards", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_key() {
        assert_eq!(board_key("abc"), "board:abc");
    }

    #[test]
    fn test_save_get_delete() {
        let store = MemoryBoardStore::default();
        let board = Board::new_seeded();
        store.save(&board).unwrap();

        assert!(store.exists(&board.id).unwrap());
        let loaded = store.get(&board.id).unwrap();
        assert_eq!(loaded, board);

        store.delete(&board.id).unwrap();
        assert!(!store.exists(&board.id).unwrap());
        assert!(matches!(
            store.get(&board.id),
            Err(RetroError::BoardNotFound(id)) if id == board.id
        ));
    }

    #[test]
    fn test_loaded_board_is_a_copy() {
        let store = MemoryBoardStore::default();
        let board = Board::new_seeded();
        store.save(&board).unwrap();

        let mut copy = store.get(&board.id).unwrap();
        copy.columns.clear();
        assert_eq!(store.get(&board.id).unwrap().columns.len(), 3);
    }

    #[test]
    fn test_entries_expire() {
        let store = MemoryBoardStore::new(Duration::from_millis(20));
        let board = Board::new_seeded();
        store.save(&board).unwrap();
        assert!(store.exists(&board.id).unwrap());

        std::thread::sleep(Duration::from_millis(40));
        assert!(!store.exists(&board.id).unwrap());
        assert!(store.get(&board.id).is_err());
    }

    #[test]
    fn test_purge_drops_unread_expired_entries() {
        let store = MemoryBoardStore::new(Duration::from_millis(20));
        for _ in 0..3 {
            store.save(&Board::new_seeded()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(40));
        let fresh = Board::new_seeded();
        store.save(&fresh).unwrap();

        assert_eq!(store.purge_expired().unwrap(), 3);
        assert_eq!(store.entries.len(), 1);
        assert!(store.exists(&fresh.id).unwrap());
        assert_eq!(store.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_blocking_returns_store_result() {
        let memory = Arc::new(MemoryBoardStore::default());
        let board = Board::new_seeded();
        memory.save(&board).unwrap();
        let store: Arc<dyn BoardStore> = memory;

        let id = board.id.clone();
        let loaded = run_blocking(&store, move |s| s.get(&id)).await.unwrap();
        assert_eq!(loaded, board);

        let missing = run_blocking(&store, |s| s.get("nope")).await;
        assert!(matches!(missing, Err(RetroError::BoardNotFound(_))));
    }

    #[test]
    fn test_save_refreshes_ttl() {
        let store = MemoryBoardStore::new(Duration::from_millis(60));
        let board = Board::new_seeded();
        store.save(&board).unwrap();

        std::thread::sleep(Duration::from_millis(40));
        store.save(&board).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.exists(&board.id).unwrap());
    }
}
