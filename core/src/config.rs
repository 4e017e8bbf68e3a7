use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::cli::Cli;

const MEMORY_PATH: &str = ":memory:";

/// Where the document store lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    File(PathBuf),
}

/// Runtime configuration resolved from CLI, environment, file and defaults.
#[derive(Clone, Debug)]
pub struct Config {
    pub store: StoreLocation,
    /// How often a file-backed store checks for writes from other processes.
    pub poll_interval: Duration,
    /// Whether informational logging is enabled.
    pub logging_enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    store: FileStore,
    #[serde(default)]
    logging: FileLogging,
}

#[derive(Deserialize)]
struct FileStore {
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default = "default_poll_ms")]
    poll_ms: u64,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

fn default_poll_ms() -> u64 {
    500
}

fn default_logging() -> bool {
    true
}

impl Default for FileStore {
    fn default() -> Self {
        Self {
            path: None,
            poll_ms: default_poll_ms(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut db: Option<PathBuf> = None;
        let mut poll_ms = default_poll_ms();
        let mut logging = default_logging();

        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("CHATSYNC_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/chatsync.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            db = file_cfg.store.path;
            poll_ms = file_cfg.store.poll_ms;
            logging = file_cfg.logging.enabled;
        }

        // environment overrides
        if let Ok(path) = std::env::var("CHATSYNC_DB") {
            db = Some(PathBuf::from(path));
        }
        if let Ok(p) = std::env::var("CHATSYNC_POLL_MS") {
            if let Ok(p) = p.parse::<u64>() {
                poll_ms = p;
            }
        }
        if let Ok(l) = std::env::var("CHATSYNC_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }

        // CLI overrides
        if let Some(path) = &cli.db {
            db = Some(path.clone());
        }
        if let Some(p) = cli.poll_ms {
            poll_ms = p;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }

        if !(10..=60_000).contains(&poll_ms) {
            anyhow::bail!("invalid_poll_interval");
        }

        let store = match db {
            _ if cli.memory => StoreLocation::Memory,
            Some(path) if path.as_os_str() == MEMORY_PATH => StoreLocation::Memory,
            Some(path) => StoreLocation::File(path),
            None => StoreLocation::File(default_db_path()),
        };

        Ok(Self {
            store,
            poll_interval: Duration::from_millis(poll_ms),
            logging_enabled: logging,
        })
    }
}

/// Default database location under the platform data directory.
pub fn default_db_path() -> PathBuf {
    ProjectDirs::from("org", "chatsync", "chatsync")
        .map(|dirs| dirs.data_dir().join("chatsync.db"))
        .unwrap_or_else(|| PathBuf::from("./chatsync.db"))
}
