//! Connection registry and broadcast actor.
//!
//! The registry (board id -> live sessions) is owned by a single task. Other
//! tasks reach it only through [`HubHandle`], whose requests are queued and
//! handled one at a time, so broadcasts for one board are seen by every
//! registered session in the same order.
//!
//! The hub holds the only sender of each session's outbound queue. Dropping a
//! [`SessionHandle`] therefore closes the queue, which tells the session's
//! write loop to send a close frame and stop.

use crate::metrics::Metrics;
use crate::store::{run_blocking, BoardStore};
use crate::{Result, RetroError};
use retro_types::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// An encoded server message, shared between all recipients.
pub type Outbound = Arc<str>;

/// Capacity of the hub's own request queue.
const HUB_QUEUE_CAPACITY: usize = 1024;

pub fn encode(msg: &ServerMessage) -> Result<Outbound> {
    Ok(serde_json::to_string(msg)?.into())
}

/// Identity of one connection, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub board_id: String,
    pub participant_id: String,
    pub is_admin: bool,
}

impl SessionInfo {
    pub fn new(board_id: impl Into<String>, is_admin: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            board_id: board_id.into(),
            participant_id: format!("user_{}", Uuid::new_v4().simple()),
            is_admin,
        }
    }
}

/// Registry entry for a session: its identity plus the sending half of its
/// bounded outbound queue.
#[derive(Debug)]
pub struct SessionHandle {
    pub info: Arc<SessionInfo>,
    tx: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    pub fn new(info: Arc<SessionInfo>, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { info, tx }, rx)
    }
}

enum HubCommand {
    Register(SessionHandle),
    Unregister {
        board_id: String,
        session_id: Uuid,
    },
    Broadcast {
        board_id: String,
        message: Outbound,
    },
    ActiveBoards(oneshot::Sender<Vec<String>>),
    Expire {
        board_id: String,
        reply: oneshot::Sender<usize>,
    },
    SessionCount {
        board_id: String,
        reply: oneshot::Sender<usize>,
    },
}

/// Cloneable front door to the hub task.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn send(&self, cmd: HubCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| RetroError::HubUnavailable)
    }

    /// Add a session and queue the current board state for it.
    pub async fn register(&self, session: SessionHandle) -> Result<()> {
        self.send(HubCommand::Register(session)).await
    }

    /// Remove a session and close its outbound queue. Unknown sessions are ignored.
    pub async fn unregister(&self, info: &SessionInfo) -> Result<()> {
        self.send(HubCommand::Unregister {
            board_id: info.board_id.clone(),
            session_id: info.id,
        })
        .await
    }

    pub async fn broadcast(&self, board_id: &str, message: Outbound) -> Result<()> {
        self.send(HubCommand::Broadcast {
            board_id: board_id.to_string(),
            message,
        })
        .await
    }

    pub async fn broadcast_message(&self, board_id: &str, msg: &ServerMessage) -> Result<()> {
        self.broadcast(board_id, encode(msg)?).await
    }

    /// Board ids that currently have at least one session.
    pub async fn active_boards(&self) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ActiveBoards(reply)).await?;
        rx.await.map_err(|_| RetroError::HubUnavailable)
    }

    /// Notify and disconnect every session on a board. Returns how many were closed.
    pub async fn expire(&self, board_id: &str) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Expire {
            board_id: board_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RetroError::HubUnavailable)
    }

    pub async fn session_count(&self, board_id: &str) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::SessionCount {
            board_id: board_id.to_string(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| RetroError::HubUnavailable)
    }
}

pub struct Hub {
    boards: HashMap<String, HashMap<Uuid, SessionHandle>>,
    store: Arc<dyn BoardStore>,
    metrics: Arc<Metrics>,
    rx: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Start the hub task. It stops once every [`HubHandle`] is dropped.
    pub fn spawn(store: Arc<dyn BoardStore>, metrics: Arc<Metrics>) -> HubHandle {
        let (tx, rx) = mpsc::channel(HUB_QUEUE_CAPACITY);
        let hub = Hub {
            boards: HashMap::new(),
            store,
            metrics,
            rx,
        };
        tokio::spawn(hub.run());
        HubHandle { tx }
    }

    async fn run(mut self) {
        debug!(target: "retro::hub", "Hub started");
        while let Some(cmd) = self.rx.recv().await {
            self.handle(cmd).await;
        }
        debug!(target: "retro::hub", "Hub stopped");
    }

    async fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(session) => self.register(session).await,
            HubCommand::Unregister {
                board_id,
                session_id,
            } => {
                if self.remove(&board_id, session_id).is_some() {
                    debug!(target: "retro::hub", "Unregistered session {} from board {}", session_id, board_id);
                }
            }
            HubCommand::Broadcast { board_id, message } => self.broadcast(&board_id, message),
            HubCommand::ActiveBoards(reply) => {
                let _ = reply.send(self.boards.keys().cloned().collect());
            }
            HubCommand::Expire { board_id, reply } => {
                let _ = reply.send(self.expire(&board_id));
            }
            HubCommand::SessionCount { board_id, reply } => {
                let count = self.boards.get(&board_id).map_or(0, |sessions| sessions.len());
                let _ = reply.send(count);
            }
        }
    }

    /// The load stays inside the hub so no broadcast can slip between the
    /// state snapshot and the registration.
    async fn register(&mut self, session: SessionHandle) {
        let info = session.info.clone();
        let board_id = info.board_id.clone();
        let state = match run_blocking(&self.store, move |store| store.get(&board_id)).await {
            Ok(board) => match encode(&ServerMessage::board_state(&board)) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    error!(target: "retro::hub", "Failed to encode board {}: {}", info.board_id, e);
                    None
                }
            },
            Err(e) => {
                error!(target: "retro::hub", "Failed to load board {} for new session: {}", info.board_id, e);
                None
            }
        };

        if let Some(state) = state {
            if session.tx.try_send(state).is_err() {
                warn!(target: "retro::hub", "Session {} could not take initial state, dropping", info.id);
                self.metrics.session_dropped();
                return;
            }
        }

        self.boards
            .entry(info.board_id.clone())
            .or_default()
            .insert(info.id, session);
        debug!(
            target: "retro::hub",
            "Registered session {} ({}) on board {}",
            info.id, info.participant_id, info.board_id
        );
    }

    /// Remove a session, dropping the board entry once it is empty.
    fn remove(&mut self, board_id: &str, session_id: Uuid) -> Option<SessionHandle> {
        let sessions = self.boards.get_mut(board_id)?;
        let removed = sessions.remove(&session_id);
        if sessions.is_empty() {
            self.boards.remove(board_id);
        }
        removed
    }

    fn broadcast(&mut self, board_id: &str, message: Outbound) {
        let Some(sessions) = self.boards.get(board_id) else {
            return;
        };

        let stalled: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.tx.try_send(message.clone()).is_err())
            .map(|s| s.info.id)
            .collect();
        self.metrics.broadcast_sent();

        for session_id in stalled {
            warn!(target: "retro::hub", "Session {} on board {} is not keeping up, dropping", session_id, board_id);
            self.remove(board_id, session_id);
            self.metrics.session_dropped();
        }
    }

    fn expire(&mut self, board_id: &str) -> usize {
        let Some(sessions) = self.boards.remove(board_id) else {
            return 0;
        };

        match encode(&ServerMessage::expired()) {
            Ok(notice) => {
                for session in sessions.values() {
                    // Best effort; a full queue just misses the notice.
                    let _ = session.tx.try_send(notice.clone());
                }
            }
            Err(e) => error!(target: "retro::hub", "Failed to encode expiry notice: {}", e),
        }

        self.metrics.board_expired();
        info!(target: "retro::hub", "Board {} expired, closing {} sessions", board_id, sessions.len());
        sessions.len()
    }
}
