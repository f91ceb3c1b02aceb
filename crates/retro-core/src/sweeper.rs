//! Periodic reconciliation of live sessions against the board store.

use crate::hub::HubHandle;
use crate::store::{run_blocking, BoardStore};
use crate::{Result, RetroError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Disconnects sessions whose board has expired or been deleted from the store.
pub struct Sweeper {
    hub: HubHandle,
    store: Arc<dyn BoardStore>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(hub: HubHandle, store: Arc<dyn BoardStore>, interval: Duration) -> Self {
        Self {
            hub,
            store,
            interval,
        }
    }

    /// One pass: purge expired boards from the store, then close sessions
    /// whose board is gone. Returns the ids of boards that were expired.
    pub async fn sweep_once(&self) -> Result<Vec<String>> {
        match run_blocking(&self.store, |store| store.purge_expired()).await {
            Ok(0) => {}
            Ok(purged) => debug!(target: "retro::sweep", "Purged {} expired boards from the store", purged),
            Err(e) => warn!(target: "retro::sweep", "Store purge failed: {}", e),
        }

        let boards = self.hub.active_boards().await?;
        debug!(target: "retro::sweep", "Checking {} active boards", boards.len());

        let mut expired = Vec::new();
        for board_id in boards {
            let id = board_id.clone();
            match run_blocking(&self.store, move |store| store.exists(&id)).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!(target: "retro::sweep", "Could not check board {}, keeping its sessions: {}", board_id, e);
                    continue;
                }
            }
            let closed = self.hub.expire(&board_id).await?;
            info!(target: "retro::sweep", "Board {} no longer stored, closed {} sessions", board_id, closed);
            expired.push(board_id);
        }
        Ok(expired)
    }

    /// Run forever on the configured interval. The first pass happens one
    /// interval after start. Stops when the hub goes away.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep_once().await {
                    Ok(_) => {}
                    Err(RetroError::HubUnavailable) => {
                        debug!(target: "retro::sweep", "Hub stopped, sweeper exiting");
                        break;
                    }
                    Err(e) => warn!(target: "retro::sweep", "Sweep failed: {}", e),
                }
            }
        })
    }
}
