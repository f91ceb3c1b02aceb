//! Command dispatch: validate, mutate the stored board, broadcast the result.
//!
//! Every mutating command runs the same sequence: load the board, apply the
//! change in memory, save it (refreshing its TTL) and broadcast the full board
//! to everyone on it. Validation failures are answered to the sender only.

use crate::hub::{HubHandle, SessionInfo};
use crate::metrics::Metrics;
use crate::store::{run_blocking, BoardStore};
use crate::validation::{self, ValidationError};
use dashmap::DashMap;
use retro_types::{
    Board, ClientMessage, Column, CommandKind, CreateColumnPayload, CreateThreadPayload,
    CreateTilePayload, DeleteColumnPayload, Envelope, ServerMessage, Thread, Tile,
    TileRefPayload, TypingEvent, UpdateColumnPayload,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_columns_per_board: usize,
    pub max_tiles_per_column: usize,
    /// Hold a per-board lock across load/mutate/save. Without it two
    /// concurrent commands on one board can lose one of the updates.
    pub serialize_mutations: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_columns_per_board: 10,
            max_tiles_per_column: 100,
            serialize_mutations: true,
        }
    }
}

/// What a mutation did to the board.
enum Change {
    Applied,
    Unchanged,
    /// Abort and tell the sender why.
    Rejected(String),
}

pub struct Dispatcher {
    store: Arc<dyn BoardStore>,
    hub: HubHandle,
    metrics: Arc<Metrics>,
    config: DispatcherConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn BoardStore>,
        hub: HubHandle,
        metrics: Arc<Metrics>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            hub,
            metrics,
            config,
            locks: DashMap::new(),
        }
    }

    /// Route a parsed envelope. Returns a message for the sending session only.
    ///
    /// Unknown types, and admin types from non-admin sessions, are dropped
    /// without a reply.
    pub async fn handle_envelope(
        &self,
        session: &SessionInfo,
        envelope: Envelope,
    ) -> Option<ServerMessage> {
        let Some(kind) = CommandKind::from_type(&envelope.kind) else {
            debug!(target: "retro::dispatch", "Ignoring unknown message type {:?}", envelope.kind);
            return None;
        };

        if kind.requires_admin() && !session.is_admin {
            debug!(
                target: "retro::dispatch",
                "Ignoring {} from non-admin {}",
                kind.as_str(),
                session.participant_id
            );
            return None;
        }

        match ClientMessage::decode(kind, envelope.payload) {
            Ok(msg) => self.dispatch(session, msg).await,
            Err(e) => {
                warn!(target: "retro::dispatch", "Bad {} payload from {}: {}", kind.as_str(), session.participant_id, e.source);
                self.metrics.message_error();
                Some(ServerMessage::error(e.message))
            }
        }
    }

    /// Run a decoded command. The admin check is the caller's job.
    pub async fn dispatch(&self, session: &SessionInfo, msg: ClientMessage) -> Option<ServerMessage> {
        debug!(
            target: "retro::dispatch",
            "{} from {} on board {}",
            msg.kind().as_str(),
            session.participant_id,
            session.board_id
        );

        match msg {
            ClientMessage::CreateTile(p) => self.create_tile(session, p).await,
            ClientMessage::RevealTile(p) => self.reveal_tile(session, p).await,
            ClientMessage::RevealAll => self.reveal_all(session).await,
            ClientMessage::VoteTile(p) => self.vote_tile(session, p).await,
            ClientMessage::CreateColumn(p) => self.create_column(session, p).await,
            ClientMessage::UpdateColumn(p) => self.update_column(session, p).await,
            ClientMessage::DeleteColumn(p) => self.delete_column(session, p).await,
            ClientMessage::Typing { typing } => {
                self.typing(session, typing).await;
                None
            }
            ClientMessage::CreateThread(p) => self.create_thread(session, p).await,
        }
    }

    fn reject(&self, err: ValidationError) -> Option<ServerMessage> {
        self.metrics.message_error();
        Some(ServerMessage::error(err.to_string()))
    }

    async fn create_tile(&self, session: &SessionInfo, p: CreateTilePayload) -> Option<ServerMessage> {
        let input = match validation::validate_create_tile(&p) {
            Ok(input) => input,
            Err(e) => return self.reject(e),
        };
        let max_tiles = self.config.max_tiles_per_column;

        self.mutate(session, move |board| {
            let Some(column) = board.columns.get_mut(&input.column_id) else {
                warn!(target: "retro::dispatch", "Column {} not found", input.column_id);
                return Change::Unchanged;
            };
            if column.tiles.len() >= max_tiles {
                return Change::Rejected(ValidationError::TooManyTiles(max_tiles).to_string());
            }
            column.tiles.push(Tile::new(input.content, input.author));
            Change::Applied
        })
        .await
    }

    async fn reveal_tile(&self, session: &SessionInfo, p: TileRefPayload) -> Option<ServerMessage> {
        self.mutate(session, |board| match board.tile_mut(&p.tile_id) {
            Some(tile) if tile.is_hidden => {
                tile.is_hidden = false;
                Change::Applied
            }
            Some(_) => Change::Unchanged,
            None => {
                warn!(target: "retro::dispatch", "Tile {} not found", p.tile_id);
                Change::Unchanged
            }
        })
        .await
    }

    async fn reveal_all(&self, session: &SessionInfo) -> Option<ServerMessage> {
        self.mutate(session, |board| {
            let revealed = board.reveal_all();
            if revealed == 0 {
                debug!(target: "retro::dispatch", "No hidden tiles to reveal on board {}", board.id);
                return Change::Unchanged;
            }
            info!(target: "retro::dispatch", "Admin revealed {} tiles on board {}", revealed, board.id);
            Change::Applied
        })
        .await
    }

    async fn vote_tile(&self, session: &SessionInfo, p: TileRefPayload) -> Option<ServerMessage> {
        let participant_id = session.participant_id.clone();
        self.mutate(session, move |board| match board.tile_mut(&p.tile_id) {
            Some(tile) => {
                tile.toggle_vote(&participant_id);
                Change::Applied
            }
            None => {
                warn!(target: "retro::dispatch", "Tile {} not found", p.tile_id);
                Change::Unchanged
            }
        })
        .await
    }

    async fn create_column(&self, session: &SessionInfo, p: CreateColumnPayload) -> Option<ServerMessage> {
        let title = match validation::validate_create_column(&p) {
            Ok(title) => title,
            Err(e) => return self.reject(e),
        };
        let max_columns = self.config.max_columns_per_board;

        self.mutate(session, move |board| {
            if board.columns.len() >= max_columns {
                return Change::Rejected(ValidationError::TooManyColumns(max_columns).to_string());
            }
            let column = Column::new(title, board.columns.len() as i64);
            board.columns.insert(column.id.clone(), column);
            Change::Applied
        })
        .await
    }

    async fn update_column(&self, session: &SessionInfo, p: UpdateColumnPayload) -> Option<ServerMessage> {
        let title = match validation::validate_update_column(&p) {
            Ok(title) => title,
            Err(e) => return self.reject(e),
        };

        self.mutate(session, move |board| match board.columns.get_mut(&p.column_id) {
            Some(column) => {
                column.title = title;
                Change::Applied
            }
            None => {
                warn!(target: "retro::dispatch", "Column {} not found for update", p.column_id);
                Change::Rejected("Column not found".to_string())
            }
        })
        .await
    }

    async fn delete_column(&self, session: &SessionInfo, p: DeleteColumnPayload) -> Option<ServerMessage> {
        if let Err(e) = validation::validate_column_id(&p.column_id) {
            return self.reject(e);
        }

        self.mutate(session, move |board| match board.columns.remove(&p.column_id) {
            Some(_) => Change::Applied,
            None => {
                warn!(target: "retro::dispatch", "Column {} not found for deletion", p.column_id);
                Change::Rejected("Column not found".to_string())
            }
        })
        .await
    }

    async fn create_thread(&self, session: &SessionInfo, p: CreateThreadPayload) -> Option<ServerMessage> {
        let input = match validation::validate_create_thread(&p) {
            Ok(input) => input,
            Err(e) => return self.reject(e),
        };

        self.mutate(session, move |board| match board.tile_mut(&input.tile_id) {
            Some(tile) => {
                tile.threads.push(Thread::new(input.content, input.author));
                Change::Applied
            }
            None => {
                warn!(target: "retro::dispatch", "Tile {} not found", input.tile_id);
                Change::Unchanged
            }
        })
        .await
    }

    async fn typing(&self, session: &SessionInfo, typing: bool) {
        let event = ServerMessage::Typing(TypingEvent {
            user_id: session.participant_id.clone(),
            board_id: session.board_id.clone(),
            typing,
        });
        if let Err(e) = self.hub.broadcast_message(&session.board_id, &event).await {
            error!(target: "retro::dispatch", "Failed to broadcast typing event: {}", e);
        }
    }

    /// Load, change, save and broadcast one board.
    async fn mutate<F>(&self, session: &SessionInfo, apply: F) -> Option<ServerMessage>
    where
        F: FnOnce(&mut Board) -> Change,
    {
        let board_id = session.board_id.as_str();
        let reply = {
            let lock = self.config.serialize_mutations.then(|| self.board_lock(board_id));
            let _guard = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            self.load_apply_save(board_id, apply).await
        };
        self.locks
            .remove_if(board_id, |_, lock| Arc::strong_count(lock) == 1);
        reply
    }

    async fn load_apply_save<F>(&self, board_id: &str, apply: F) -> Option<ServerMessage>
    where
        F: FnOnce(&mut Board) -> Change,
    {
        let id = board_id.to_string();
        let mut board = match run_blocking(&self.store, move |store| store.get(&id)).await {
            Ok(board) => board,
            Err(e) => {
                error!(target: "retro::dispatch", "Failed to load board {}: {}", board_id, e);
                return None;
            }
        };

        match apply(&mut board) {
            Change::Applied => {}
            Change::Unchanged => return None,
            Change::Rejected(message) => {
                self.metrics.message_error();
                return Some(ServerMessage::error(message));
            }
        }

        board.touch();
        let saved = board.clone();
        if let Err(e) = run_blocking(&self.store, move |store| store.save(&saved)).await {
            error!(target: "retro::dispatch", "Failed to save board {}: {}", board_id, e);
            return None;
        }

        // Still under the board lock, so broadcasts leave in save order.
        if let Err(e) = self
            .hub
            .broadcast_message(board_id, &ServerMessage::board_state(&board))
            .await
        {
            error!(target: "retro::dispatch", "Failed to broadcast board {}: {}", board_id, e);
        }
        None
    }

    fn board_lock(&self, board_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(board_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
