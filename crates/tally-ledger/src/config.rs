//! Ledger configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                | Default          |
//! |-------------------------|------------------|
//! | `TALLY_DATABASE_PATH`   | `tally.db`       |
//! | `TALLY_MAX_CONNECTIONS` | `5`              |
//! | `TALLY_LOCK_TIMEOUT_MS` | `5000`           |
//! | `TALLY_LOG`             | `info,sqlx=warn` |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tally_db::DbConfig;

/// Ledger engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file, or `:memory:`
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Longest wait for a product lock before giving up with a conflict
    pub lock_timeout_ms: u64,

    /// `EnvFilter` directive for the tracing subscriber
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("tally.db"),
            max_connections: 5,
            lock_timeout_ms: 5_000,
            log_filter: "info,sqlx=warn".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let config = LedgerConfig {
            database_path: lookup("TALLY_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse_or(&lookup, "TALLY_MAX_CONNECTIONS", defaults.max_connections)?,

            lock_timeout_ms: parse_or(&lookup, "TALLY_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms)?,

            log_filter: lookup("TALLY_LOG").unwrap_or(defaults.log_filter),
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue("TALLY_MAX_CONNECTIONS".to_string()));
        }
        if config.lock_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("TALLY_LOCK_TIMEOUT_MS".to_string()));
        }

        Ok(config)
    }

    /// In-memory configuration for tests.
    pub fn in_memory() -> Self {
        LedgerConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            ..LedgerConfig::default()
        }
    }

    /// Product lock acquisition bound.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Database settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        if self.database_path.as_os_str() == ":memory:" {
            return DbConfig::in_memory();
        }
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
