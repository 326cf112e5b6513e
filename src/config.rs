//! Ingestion configuration from environment variables
//!
//! Mirrors the feature flags and identity settings consumed by `System`
//! and `Session`. Loaded once at startup (after `dotenv`).

use std::env;

/// Default cursor name used when `INGEST_CURSOR_NAME` is not set.
pub const DEFAULT_CURSOR_NAME: &str = "HISTORY";

/// Configuration for the ingestion system
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Path to the upstream (core) SQLite database
    pub core_db_path: String,

    /// Path to the destination (history) SQLite database
    pub history_db_path: String,

    /// Directory holding the destination schema migrations
    pub history_schema_dir: String,

    /// Identifies this ingester's position marker in the upstream store.
    /// Distinct names let several ingesters share one upstream store.
    pub cursor_name: String,

    /// Recompute asset statistics for touched assets
    pub enable_asset_stats: bool,

    /// Ingest failed transactions (and their operations)
    pub ingest_failed_transactions: bool,

    /// Do not advance the upstream cursor marker at session end
    pub skip_cursor_update: bool,

    /// Minimum number of ledgers to retain (0 = all). Enforced by an external pruner.
    pub history_retention_count: u32,

    /// Optional explicit range for the runtime binary
    pub first_ledger: Option<u32>,
    pub last_ledger: Option<u32>,

    /// Delete previously ingested rows for the range before ingesting
    pub clear_existing: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            core_db_path: String::new(),
            history_db_path: String::new(),
            history_schema_dir: "sql/history".to_string(),
            cursor_name: DEFAULT_CURSOR_NAME.to_string(),
            enable_asset_stats: false,
            ingest_failed_transactions: false,
            skip_cursor_update: false,
            history_retention_count: 0,
            first_ledger: None,
            last_ledger: None,
            clear_existing: false,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CORE_DB_PATH` (required)
    /// - `HISTORY_DB_PATH` (required)
    /// - `HISTORY_SCHEMA_DIR` (default: sql/history)
    /// - `INGEST_CURSOR_NAME` (default: HISTORY)
    /// - `ENABLE_ASSET_STATS` (default: false)
    /// - `INGEST_FAILED_TRANSACTIONS` (default: false)
    /// - `SKIP_CURSOR_UPDATE` (default: false)
    /// - `HISTORY_RETENTION_COUNT` (default: 0)
    /// - `INGEST_FIRST_LEDGER` / `INGEST_LAST_LEDGER` (optional)
    /// - `INGEST_CLEAR_EXISTING` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let core_db_path = env::var("CORE_DB_PATH")
            .map_err(|_| ConfigError::MissingVariable("CORE_DB_PATH".to_string()))?;

        let history_db_path = env::var("HISTORY_DB_PATH")
            .map_err(|_| ConfigError::MissingVariable("HISTORY_DB_PATH".to_string()))?;

        let config = Self {
            core_db_path,
            history_db_path,
            history_schema_dir: env::var("HISTORY_SCHEMA_DIR")
                .unwrap_or_else(|_| "sql/history".to_string()),
            cursor_name: env::var("INGEST_CURSOR_NAME")
                .unwrap_or_else(|_| DEFAULT_CURSOR_NAME.to_string()),
            enable_asset_stats: bool_var("ENABLE_ASSET_STATS"),
            ingest_failed_transactions: bool_var("INGEST_FAILED_TRANSACTIONS"),
            skip_cursor_update: bool_var("SKIP_CURSOR_UPDATE"),
            history_retention_count: parse_var("HISTORY_RETENTION_COUNT")?.unwrap_or(0),
            first_ledger: parse_var("INGEST_FIRST_LEDGER")?,
            last_ledger: parse_var("INGEST_LAST_LEDGER")?,
            clear_existing: bool_var("INGEST_CLEAR_EXISTING"),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cursor_name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "INGEST_CURSOR_NAME cannot be empty".to_string(),
            ));
        }

        if !self
            .cursor_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidValue(format!(
                "INGEST_CURSOR_NAME must be alphanumeric or '_', got {:?}",
                self.cursor_name
            )));
        }

        if let (Some(first), Some(last)) = (self.first_ledger, self.last_ledger) {
            if first > last {
                return Err(ConfigError::InvalidValue(format!(
                    "INGEST_FIRST_LEDGER ({}) must not exceed INGEST_LAST_LEDGER ({})",
                    first, last
                )));
            }
        }

        if self.first_ledger == Some(0) {
            return Err(ConfigError::InvalidValue(
                "INGEST_FIRST_LEDGER must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        .parse::<bool>()
        .unwrap_or(false)
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{} is not a valid number: {:?}", name, raw))),
        Err(_) => Ok(None),
    }
}
