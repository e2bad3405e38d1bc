//! In-memory reference implementation of the repository traits, for tests
//! and the default non-persistent build.
//!
//! Grounded in `kube_runtime::reflector::store::{Store, Writer}`: a cheap-
//! clone handle around shared interior-mutable state. That type uses
//! `Arc<DashMap<...>>`; since this crate does not otherwise need `dashmap`
//! (the teacher's other shared maps all go through `parking_lot::RwLock`,
//! e.g. `shared_store::ready_token::ReadyToken`), the same `parking_lot`
//! dependency is reused here instead of pulling in a second concurrent-map
//! crate for one call site.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{
    AlertRecord, AlertRepository, StoreError, SubscriberRecord, SubscriberRepository,
    VideoSourceRecord, VideoSourceRepository,
};

/// Shared in-memory backing for [`MemoryVideoSourceRepository`].
#[derive(Clone, Default)]
pub struct MemoryVideoSourceRepository {
    rows: Arc<RwLock<HashMap<i64, VideoSourceRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryVideoSourceRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn name_taken(rows: &HashMap<i64, VideoSourceRecord>, name: &str, excluding: Option<i64>) -> bool {
        rows.values().any(|r| r.name == name && Some(r.id) != excluding)
    }
}

#[async_trait]
impl VideoSourceRepository for MemoryVideoSourceRepository {
    async fn insert(&self, mut record: VideoSourceRecord) -> Result<VideoSourceRecord, StoreError> {
        let mut rows = self.rows.write();
        if Self::name_taken(&rows, &record.name, None) {
            return Err(StoreError::DuplicateName(record.name));
        }
        record.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: VideoSourceRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        if Self::name_taken(&rows, &record.name, Some(record.id)) {
            return Err(StoreError::DuplicateName(record.name));
        }
        rows.insert(record.id, record);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.rows.write().remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    async fn get(&self, id: i64) -> Result<VideoSourceRecord, StoreError> {
        self.rows.read().get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn all(&self) -> Result<Vec<VideoSourceRecord>, StoreError> {
        Ok(self.rows.read().values().cloned().collect())
    }
}

/// Shared in-memory backing for [`MemorySubscriberRepository`].
#[derive(Clone, Default)]
pub struct MemorySubscriberRepository {
    rows: Arc<RwLock<HashMap<i64, SubscriberRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl MemorySubscriberRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn name_taken(rows: &HashMap<i64, SubscriberRecord>, name: &str, excluding: Option<i64>) -> bool {
        rows.values().any(|r| r.name == name && Some(r.id) != excluding)
    }
}

#[async_trait]
impl SubscriberRepository for MemorySubscriberRepository {
    async fn insert(&self, mut record: SubscriberRecord) -> Result<SubscriberRecord, StoreError> {
        let mut rows = self.rows.write();
        if Self::name_taken(&rows, &record.name, None) {
            return Err(StoreError::DuplicateName(record.name));
        }
        record.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, record: SubscriberRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        if !rows.contains_key(&record.id) {
            return Err(StoreError::NotFound(record.id));
        }
        if Self::name_taken(&rows, &record.name, Some(record.id)) {
            return Err(StoreError::DuplicateName(record.name));
        }
        rows.insert(record.id, record);
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.rows.write().remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    async fn get(&self, id: i64) -> Result<SubscriberRecord, StoreError> {
        self.rows.read().get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn all(&self) -> Result<Vec<SubscriberRecord>, StoreError> {
        Ok(self.rows.read().values().cloned().collect())
    }
}

/// Shared in-memory backing for [`MemoryAlertRepository`].
#[derive(Clone, Default)]
pub struct MemoryAlertRepository {
    rows: Arc<RwLock<HashMap<i64, AlertRecord>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryAlertRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn insert(&self, mut record: AlertRecord) -> Result<AlertRecord, StoreError> {
        record.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.write().insert(record.id, record.clone());
        Ok(record)
    }

    async fn all(&self, source: Option<&str>) -> Result<Vec<AlertRecord>, StoreError> {
        let rows = self.rows.read();
        let mut out: Vec<AlertRecord> = match source {
            Some(name) => rows
                .values()
                .filter(|r| r.source == name && !r.source_deleted)
                .cloned()
                .collect(),
            None => rows.values().cloned().collect(),
        };
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    async fn mark_source_deleted(&self, name: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        for record in rows.values_mut() {
            if record.source == name {
                record.source_deleted = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn source(name: &str) -> VideoSourceRecord {
        VideoSourceRecord {
            id: 0,
            name: name.to_string(),
            enabled: false,
            detect_interval: 1.0,
            vidstream_plugin_name: "p".to_string(),
            vidstream_component_name: "c".to_string(),
            vidstream_config: json!({}),
            detector_plugin_name: "p".to_string(),
            detector_component_name: "c".to_string(),
            detector_config: json!({}),
        }
    }

    fn alert(source: &str, deleted: bool) -> AlertRecord {
        AlertRecord {
            id: 0,
            header: "Camera Alert".to_string(),
            description: "Detected: person".to_string(),
            source: source.to_string(),
            source_type: "Video Source".to_string(),
            source_deleted: deleted,
            timestamp: Utc::now(),
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let repo = MemoryVideoSourceRepository::new();
        let a = repo.insert(source("a")).await.unwrap();
        let b = repo.insert(source("b")).await.unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_names() {
        let repo = MemoryVideoSourceRepository::new();
        repo.insert(source("front-door")).await.unwrap();
        let err = repo.insert(source("front-door")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn get_missing_row_errors() {
        let repo = MemoryVideoSourceRepository::new();
        assert!(matches!(repo.get(42).await, Err(StoreError::NotFound(42))));
    }

    #[tokio::test]
    async fn alerts_filtered_by_source_exclude_deleted_rows() {
        let repo = MemoryAlertRepository::new();
        repo.insert(alert("cam-1", false)).await.unwrap();
        repo.insert(alert("cam-1", true)).await.unwrap();
        repo.insert(alert("cam-2", false)).await.unwrap();

        let filtered = repo.all(Some("cam-1")).await.unwrap();
        assert_eq!(filtered.len(), 1);

        let unfiltered = repo.all(None).await.unwrap();
        assert_eq!(unfiltered.len(), 3);
    }

    #[tokio::test]
    async fn mark_source_deleted_flags_every_matching_row() {
        let repo = MemoryAlertRepository::new();
        repo.insert(alert("cam-1", false)).await.unwrap();
        repo.insert(alert("cam-1", false)).await.unwrap();

        repo.mark_source_deleted("cam-1").await.unwrap();

        let rows = repo.all(None).await.unwrap();
        assert!(rows.iter().all(|r| r.source_deleted));
    }
}
