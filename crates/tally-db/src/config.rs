//! Runtime configuration.
//!
//! Loaded from environment variables with fallback to defaults.
//!
//! | Variable                      | Default          |
//! |-------------------------------|------------------|
//! | `TALLY_DB_PATH`               | `./tally.db`     |
//! | `TALLY_DB_MAX_CONNECTIONS`    | `5`              |
//! | `TALLY_DB_BUSY_TIMEOUT_SECS`  | `5`              |
//! | `TALLY_RUN_MIGRATIONS`        | `true`           |
//! | `TALLY_LOG`                   | `info,tally_db=debug,sqlx=warn` (`RUST_LOG` wins) |

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::pool::DbConfig;

/// Default log filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tally_db=debug,sqlx=warn";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool upper bound
    pub max_connections: u32,

    /// How long a connection waits on a locked database
    pub busy_timeout_secs: u64,

    /// Apply pending migrations on connect
    pub run_migrations: bool,

    /// `tracing` filter directives
    pub log_filter: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = AppConfig {
            database_path: lookup("TALLY_DB_PATH")
                .unwrap_or_else(|| "./tally.db".to_string())
                .into(),

            max_connections: lookup("TALLY_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TALLY_DB_MAX_CONNECTIONS".to_string()))?,

            busy_timeout_secs: lookup("TALLY_DB_BUSY_TIMEOUT_SECS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("TALLY_DB_BUSY_TIMEOUT_SECS".to_string())
                })?,

            run_migrations: lookup("TALLY_RUN_MIGRATIONS")
                .unwrap_or_else(|| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TALLY_RUN_MIGRATIONS".to_string()))?,

            log_filter: lookup("TALLY_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        };

        if config.database_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("TALLY_DB_PATH".to_string()));
        }

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "TALLY_DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(config)
    }

    /// Pool settings for this configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
            .run_migrations(self.run_migrations)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Initializes the tracing subscriber for structured logging.
///
/// `RUST_LOG` takes precedence over `fallback`. Calling it twice is
/// harmless; the second subscriber is ignored.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
