//! Server configuration.

use anyhow::{Result, bail};
use retro_core::{BoardStore, DispatcherConfig, MemoryBoardStore, SqliteBoardStore};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Ten years. Keeps expiry timestamps well inside `i64` milliseconds.
const MAX_BOARD_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. A single `"*"` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_board_ttl_secs")]
    pub board_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Largest inbound WebSocket message, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Read idle timeout; pings go out at 9/10 of this.
    #[serde(default = "default_pong_wait_secs")]
    pub pong_wait_secs: u64,
    #[serde(default = "default_write_wait_secs")]
    pub write_wait_secs: u64,
    #[serde(default = "default_max_columns")]
    pub max_columns_per_board: usize,
    #[serde(default = "default_max_tiles")]
    pub max_tiles_per_column: usize,
    #[serde(default = "default_true")]
    pub serialize_board_mutations: bool,
    /// Sustained HTTP requests per second allowed from one client IP.
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: f64,
    #[serde(default = "default_rate_limit_burst")]
    pub rate_limit_burst: u32,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_board_ttl_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

fn default_max_message_size() -> usize {
    16 * 1024
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_pong_wait_secs() -> u64 {
    60
}

fn default_write_wait_secs() -> u64 {
    10
}

fn default_max_columns() -> usize {
    10
}

fn default_max_tiles() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_rps() -> f64 {
    10.0
}

fn default_rate_limit_burst() -> u32 {
    20
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("live-retro")
        .join("boards.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            board_ttl_secs: default_board_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_message_size: default_max_message_size(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            pong_wait_secs: default_pong_wait_secs(),
            write_wait_secs: default_write_wait_secs(),
            max_columns_per_board: default_max_columns(),
            max_tiles_per_column: default_max_tiles(),
            serialize_board_mutations: default_true(),
            rate_limit_rps: default_rate_limit_rps(),
            rate_limit_burst: default_rate_limit_burst(),
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("pong_wait_secs", self.pong_wait_secs),
            ("write_wait_secs", self.write_wait_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("board_ttl_secs", self.board_ttl_secs),
        ] {
            if secs == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if self.board_ttl_secs > MAX_BOARD_TTL_SECS {
            bail!("board_ttl_secs must be at most {}", MAX_BOARD_TTL_SECS);
        }
        for (name, value) in [
            ("max_message_size", self.max_message_size),
            ("outbound_queue_capacity", self.outbound_queue_capacity),
            ("rate_limit_burst", self.rate_limit_burst as usize),
        ] {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }
        if !(self.rate_limit_rps.is_finite() && self.rate_limit_rps > 0.0) {
            bail!("rate_limit_rps must be a positive number");
        }
        Ok(())
    }

    /// Load config from default location (config/default.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    pub fn board_ttl(&self) -> Duration {
        Duration::from_secs(self.board_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_columns_per_board: self.max_columns_per_board,
            max_tiles_per_column: self.max_tiles_per_column,
            serialize_mutations: self.serialize_board_mutations,
        }
    }

    pub fn open_store(&self) -> retro_core::Result<Arc<dyn BoardStore>> {
        Ok(match self.store.backend {
            StoreBackend::Memory => Arc::new(MemoryBoardStore::new(self.board_ttl())),
            StoreBackend::Sqlite => {
                Arc::new(SqliteBoardStore::open(&self.store.db_path, self.board_ttl())?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.board_ttl(), Duration::from_secs(1800));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.ping_period(), Duration::from_secs(54));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.serialize_board_mutations);
    }

    #[test]
    fn test_partial_overrides() {
        let config: Config = toml::from_str(
            r#"
            port = 9000
            max_columns_per_board = 4
            serialize_board_mutations = false

            [store]
            backend = "sqlite"
            db_path = "/tmp/boards.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/boards.db"));

        let dispatch = config.dispatcher_config();
        assert_eq!(dispatch.max_columns_per_board, 4);
        assert_eq!(dispatch.max_tiles_per_column, 100);
        assert!(!dispatch.serialize_mutations);
    }

    #[test]
    fn test_open_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.backend = StoreBackend::Sqlite;
        config.store.db_path = dir.path().join("boards.db");

        let store = config.open_store().unwrap();
        let board = retro_types::Board::new_seeded();
        store.save(&board).unwrap();
        assert!(store.exists(&board.id).unwrap());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/default.toml");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.max_message_size, 16 * 1024);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.rate_limit_burst, 20);
    }

    fn load_str(content: &str) -> Result<Config> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        Config::load_from(&path)
    }

    #[test]
    fn test_zero_pong_wait_rejected() {
        let err = load_str("pong_wait_secs = 0").unwrap_err();
        assert!(err.to_string().contains("pong_wait_secs"));
    }

    #[test]
    fn test_huge_board_ttl_rejected() {
        let err = load_str("board_ttl_secs = 9223372036854775807").unwrap_err();
        assert!(err.to_string().contains("board_ttl_secs"));

        assert!(load_str("board_ttl_secs = 315360000").is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        for content in [
            "write_wait_secs = 0",
            "sweep_interval_secs = 0",
            "outbound_queue_capacity = 0",
            "max_message_size = 0",
            "rate_limit_rps = 0.0",
            "rate_limit_burst = 0",
        ] {
            assert!(load_str(content).is_err(), "{} should be rejected", content);
        }
        assert!(Config::default().validate().is_ok());
    }
}
