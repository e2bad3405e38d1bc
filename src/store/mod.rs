//! Persistence trait boundary (spec §6's row store) plus an in-memory
//! reference implementation in [`memory`].
//!
//! The relational engine itself is explicitly out of scope (spec §1); these
//! traits are the narrow seam the managers depend on, grounded in
//! `kube_client::Api<K>`'s shape (a small object-safe async CRUD surface,
//! made object-safe here with `async-trait` the same way `kube_client`'s
//! dynamic `Api` methods are).

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Persisted row for the `video_source` table (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSourceRecord {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub detect_interval: f64,
    pub vidstream_plugin_name: String,
    pub vidstream_component_name: String,
    pub vidstream_config: Value,
    pub detector_plugin_name: String,
    pub detector_component_name: String,
    pub detector_config: Value,
}

/// Persisted row for the `subscriber` table (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriberRecord {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub plugin_name: String,
    pub component_name: String,
    pub config: Value,
}

/// Persisted row for the `alert` table (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub id: i64,
    pub header: String,
    pub description: String,
    pub source: String,
    pub source_type: String,
    pub source_deleted: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub data: Value,
}

/// Errors surfaced across the persistence boundary. Per spec §7, these
/// propagate to the caller rather than being swallowed: "Config/store I/O
/// failures propagate to the caller; the UI surfaces a notification;
/// in-memory state is unchanged."
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no row with id {0}")]
    NotFound(i64),
    #[error("a row named {0:?} already exists")]
    DuplicateName(String),
    #[error("backing store I/O error: {0}")]
    Io(String),
}

/// CRUD over `video_source` rows.
#[async_trait]
pub trait VideoSourceRepository: Send + Sync {
    async fn insert(&self, record: VideoSourceRecord) -> Result<VideoSourceRecord, StoreError>;
    async fn update(&self, record: VideoSourceRecord) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    async fn get(&self, id: i64) -> Result<VideoSourceRecord, StoreError>;
    async fn all(&self) -> Result<Vec<VideoSourceRecord>, StoreError>;
}

/// CRUD over `subscriber` rows.
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    async fn insert(&self, record: SubscriberRecord) -> Result<SubscriberRecord, StoreError>;
    async fn update(&self, record: SubscriberRecord) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    async fn get(&self, id: i64) -> Result<SubscriberRecord, StoreError>;
    async fn all(&self) -> Result<Vec<SubscriberRecord>, StoreError>;
}

/// Append-mostly access to `alert` rows.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, record: AlertRecord) -> Result<AlertRecord, StoreError>;
    /// All alerts, optionally filtered to one `source` name.
    async fn all(&self, source: Option<&str>) -> Result<Vec<AlertRecord>, StoreError>;
    /// Marks every row with `source == name` as `source_deleted = true`.
    async fn mark_source_deleted(&self, name: &str) -> Result<(), StoreError>;
}
