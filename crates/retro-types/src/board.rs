//! Board aggregate: columns, tiles and threads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Titles of the columns every new board starts with, in display order.
pub const DEFAULT_COLUMN_TITLES: [&str; 3] =
    ["What went well?", "What could be improved?", "Action items"];

/// A retrospective board.
///
/// `columns` is keyed by column id. Display order comes from [`Column::order`],
/// not from map iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    /// Capability token granting admin rights. Empty once redacted.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub admin_key: String,
    pub columns: HashMap<String, Column>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A column on a board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub id: String,
    pub title: String,
    /// Sort key. Not necessarily contiguous or unique.
    pub order: i64,
    #[serde(default)]
    pub tiles: Vec<Tile>,
}

/// A sticky note inside a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    pub is_hidden: bool,
    /// Participants who voted for this tile. Never contains duplicates.
    #[serde(default)]
    pub voter_ids: Vec<String>,
    #[serde(default)]
    pub threads: Vec<Thread>,
    pub created_at: DateTime<Utc>,
}

/// A reply attached to a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub author: String,
    pub created_at: DateTime<Utc>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Board {
    /// Create a board with a fresh id and admin key and the three default columns.
    pub fn new_seeded() -> Self {
        let now = Utc::now();
        let columns = DEFAULT_COLUMN_TITLES
            .iter()
            .enumerate()
            .map(|(order, title)| {
                let column = Column::new(*title, order as i64);
                (column.id.clone(), column)
            })
            .collect();

        Self {
            id: new_id(),
            admin_key: new_id(),
            columns,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `key` is this board's admin key. An empty key never matches.
    pub fn is_admin_key(&self, key: &str) -> bool {
        !key.is_empty() && !self.admin_key.is_empty() && self.admin_key == key
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Copy of this board without the admin key, for sending to clients.
    pub fn redacted(&self) -> Self {
        Self {
            admin_key: String::new(),
            ..self.clone()
        }
    }

    /// Columns sorted by `order`, ties broken by id for a stable result.
    pub fn sorted_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.values().collect();
        columns.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        columns
    }

    pub fn tile_mut(&mut self, tile_id: &str) -> Option<&mut Tile> {
        self.columns
            .values_mut()
            .flat_map(|column| column.tiles.iter_mut())
            .find(|tile| tile.id == tile_id)
    }

    pub fn tile(&self, tile_id: &str) -> Option<&Tile> {
        self.columns
            .values()
            .flat_map(|column| column.tiles.iter())
            .find(|tile| tile.id == tile_id)
    }

    /// Reveal every hidden tile. Returns how many tiles changed.
    pub fn reveal_all(&mut self) -> usize {
        let mut revealed = 0;
        for tile in self.columns.values_mut().flat_map(|c| c.tiles.iter_mut()) {
            if tile.is_hidden {
                tile.is_hidden = false;
                revealed += 1;
            }
        }
        revealed
    }

    pub fn tile_count(&self) -> usize {
        self.columns.values().map(|c| c.tiles.len()).sum()
    }
}

impl Column {
    pub fn new(title: impl Into<String>, order: i64) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            order,
            tiles: Vec::new(),
        }
    }
}

impl Tile {
    /// New tiles always start hidden, with no votes and no threads.
    pub fn new(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            author: author.into(),
            is_hidden: true,
            voter_ids: Vec::new(),
            threads: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Add the participant's vote, or remove it if already present.
    /// Returns `true` when the vote was added.
    pub fn toggle_vote(&mut self, participant_id: &str) -> bool {
        if let Some(pos) = self.voter_ids.iter().position(|v| v == participant_id) {
            self.voter_ids.remove(pos);
            false
        } else {
            self.voter_ids.push(participant_id.to_string());
            true
        }
    }
}

impl Thread {
    pub fn new(content: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            content: content.into(),
            author: author.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_board_has_three_empty_columns() {
        let board = Board::new_seeded();
        assert_eq!(board.columns.len(), 3);

        let columns = board.sorted_columns();
        let orders: Vec<i64> = columns.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        let titles: Vec<&str> = columns.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, DEFAULT_COLUMN_TITLES.to_vec());
        assert!(columns.iter().all(|c| c.tiles.is_empty()));
        assert!(!board.admin_key.is_empty());
        assert_ne!(board.id, board.admin_key);
    }

    #[test]
    fn test_new_tile_is_hidden_without_votes() {
        let tile = Tile::new("hello", "");
        assert!(tile.is_hidden);
        assert!(tile.voter_ids.is_empty());
        assert!(tile.threads.is_empty());
    }

    #[test]
    fn test_vote_toggle() {
        let mut tile = Tile::new("hello", "");
        assert!(tile.toggle_vote("user_a"));
        assert!(!tile.toggle_vote("user_a"));
        assert!(tile.voter_ids.is_empty());

        tile.toggle_vote("user_a");
        tile.toggle_vote("user_b");
        assert_eq!(tile.voter_ids, vec!["user_a", "user_b"]);
    }

    #[test]
    fn test_reveal_all_counts_changes() {
        let mut board = Board::new_seeded();
        let column_id = board.sorted_columns()[0].id.clone();
        let column = board.columns.get_mut(&column_id).unwrap();
        column.tiles.push(Tile::new("a", ""));
        column.tiles.push(Tile::new("b", ""));

        assert_eq!(board.reveal_all(), 2);
        assert_eq!(board.reveal_all(), 0);
    }

    #[test]
    fn test_admin_key_check() {
        let board = Board::new_seeded();
        let key = board.admin_key.clone();
        assert!(board.is_admin_key(&key));
        assert!(!board.is_admin_key(""));
        assert!(!board.is_admin_key("nope"));
        assert!(!board.redacted().is_admin_key(""));
    }

    #[test]
    fn test_redacted_board_omits_admin_key() {
        let board = Board::new_seeded();
        let json = serde_json::to_value(board.redacted()).unwrap();
        assert!(json.get("adminKey").is_none());

        let stored = serde_json::to_value(&board).unwrap();
        assert_eq!(stored["adminKey"], board.admin_key.as_str());
        assert!(stored.get("createdAt").is_some());
    }

    #[test]
    fn test_touch_never_goes_backwards() {
        let mut board = Board::new_seeded();
        let future = Utc::now() + chrono::Duration::hours(1);
        board.updated_at = future;
        board.touch();
        assert_eq!(board.updated_at, future);
    }
}
