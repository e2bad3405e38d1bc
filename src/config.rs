//! Runtime configuration (spec §6), grounded in `sentinel_server/config.py`
//! and `sentinel_server/globals.py`'s `init_config` from
//! `examples/original_source/packages/sentinel-server`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Overrides the default configuration file path.
pub const CONFIG_PATH_ENV: &str = "SENTINEL_CONFIG_PATH";
/// Selects the `tracing` verbosity (`DEBUG`/`INFO`/`WARNING`/`ERROR`/`CRITICAL`).
pub const LOG_LEVEL_ENV: &str = "SENTINEL_LOG_LEVEL";

const DEFAULT_CONFIG_PATH: &str = "./sentinel.toml";

/// Persisted application configuration (spec §6's configuration file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub db_url: String,
    pub plugin_whitelist: HashSet<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            db_url: "sqlite://sentinel.db".to_string(),
            plugin_whitelist: HashSet::new(),
        }
    }
}

impl Configuration {
    /// Resolves the configuration path: `SENTINEL_CONFIG_PATH` if set,
    /// otherwise a plain relative fallback (no platform-directory lookup —
    /// that's the kind of external concern spec.md's Out-of-scope excludes).
    #[must_use]
    pub fn resolve_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Loads configuration from `path`. A missing file is treated as "first
    /// run": defaults are written to `path` and returned.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save(path).await?;
                Ok(config)
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Serializes this configuration to `path` as TOML.
    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Maps `SENTINEL_LOG_LEVEL` onto a `tracing::Level`, defaulting to `INFO`
/// for an unset or unrecognized value. `tracing` has no `CRITICAL` level, so
/// both `WARNING` and `CRITICAL` collapse the way spec.md §6 specifies
/// (`WARNING` -> `WARN`, `CRITICAL` -> `ERROR`).
#[must_use]
pub fn log_level_from_env() -> tracing::Level {
    match std::env::var(LOG_LEVEL_ENV).ok().as_deref() {
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") | Some("CRITICAL") => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
