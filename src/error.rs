//! Crate-wide error aggregation.
//!
//! Individual modules define their own narrow `thiserror` enums (mirroring
//! `kube_runtime::controller::Error`, `kube_runtime::watcher::Error`, ...);
//! this module only aggregates the ones that cross a manager's public API
//! boundary, so callers driving the orchestration plane have a single error
//! type to match on.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the video source lifecycle (`enable`/`disable`/`delete`).
#[derive(Debug, Error)]
pub enum VideoSourceError {
    /// No video source with the given id is known to the manager.
    #[error("no video source with id {0}")]
    NotFound(i64),
    /// The descriptor's plugin/component could not be resolved (missing or unloaded plugin).
    #[error("could not resolve component for video source {0}: {1}")]
    ComponentUnresolved(i64, String),
    /// The persistence layer failed.
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced by the subscriber lifecycle.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// No subscriber with the given id is known to the manager.
    #[error("no subscriber with id {0}")]
    NotFound(i64),
    /// The descriptor's plugin/component could not be resolved.
    #[error("could not resolve component for subscriber {0}: {1}")]
    ComponentUnresolved(i64, String),
    /// The persistence layer failed.
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Errors surfaced while loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("configuration I/O error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file could not be parsed as TOML.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The configuration could not be serialized back to TOML.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}
