//! Shared application state.

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use retro_core::{BoardStore, Dispatcher, Hub, HubHandle, Metrics, Sweeper};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn BoardStore>,
    pub hub: HubHandle,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Open the configured store and start the hub. Must run inside a tokio runtime.
    pub fn new(config: Config) -> retro_core::Result<Self> {
        let store = config.open_store()?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn BoardStore>) -> Self {
        let metrics = Arc::new(Metrics::new());
        let hub = Hub::spawn(store.clone(), metrics.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            hub.clone(),
            metrics.clone(),
            config.dispatcher_config(),
        ));
        let rate_limiter = RateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);

        Self {
            config,
            store,
            hub,
            dispatcher,
            metrics,
            rate_limiter,
        }
    }

    pub fn start_sweeper(&self) -> JoinHandle<()> {
        Sweeper::new(self.hub.clone(), self.store.clone(), self.config.sweep_interval()).spawn()
    }
}
