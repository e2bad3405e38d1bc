//! `AlertManager`: the always-attached auxiliary sink that persists every
//! alert and re-broadcasts it to UI observers (spec §4.7).

use std::sync::Arc;
use std::convert::Infallible;

use async_trait::async_trait;

use crate::model::{Alert, ManagedAlert};
use crate::store::{AlertRecord, AlertRepository, StoreError};
use crate::subject::{Observer, Subject, Subscription};
use crate::subscriber::AsyncSubscriber;

/// Reserved [`crate::subscriber::registrar::SubscriberId`] the `AlertManager`
/// registers itself under. Real subscriber ids come from
/// `MemorySubscriberRepository` (and any other repository implementation),
/// which starts auto-increment ids at `1`, so `0` is always free.
pub const AUXILIARY_SUBSCRIBER_ID: i64 = 0;

/// Persists every alert delivered through the registrar and re-emits a
/// [`ManagedAlert`] for UI consumers (live tables, charts).
pub struct AlertManager {
    repo: Arc<dyn AlertRepository>,
    subject: Subject<ManagedAlert, Infallible>,
}

impl AlertManager {
    #[must_use]
    pub fn new(repo: Arc<dyn AlertRepository>) -> Arc<Self> {
        Arc::new(Self {
            repo,
            subject: Subject::new(),
        })
    }

    /// Managed alerts, optionally filtered to one source (spec §4.7: when
    /// filtered, only rows not yet marked `source_deleted`).
    pub async fn get_alerts(&self, source: Option<&str>) -> Result<Vec<ManagedAlert>, StoreError> {
        let records = self.repo.all(source).await?;
        Ok(records.into_iter().map(record_to_managed).collect())
    }

    /// Attaches `observer` to the managed-alert subject.
    pub async fn subscribe(
        &self,
        observer: Arc<dyn Observer<ManagedAlert, Infallible>>,
    ) -> Subscription<ManagedAlert, Infallible> {
        self.subject.subscribe(observer).await
    }

    /// Marks every historical alert for `name` as `source_deleted` (spec §4.5's
    /// delete-cascade).
    pub async fn mark_source_deleted(&self, name: &str) -> Result<(), StoreError> {
        self.repo.mark_source_deleted(name).await
    }
}

fn record_to_managed(record: AlertRecord) -> ManagedAlert {
    let mut data = std::collections::BTreeMap::new();
    if let serde_json::Value::Object(map) = record.data {
        for (k, v) in map {
            data.insert(k, v);
        }
    }
    ManagedAlert {
        id: record.id,
        alert: Alert {
            header: record.header,
            description: record.description,
            source: record.source,
            source_type: record.source_type,
            timestamp: record.timestamp,
            data,
        },
        source_deleted: record.source_deleted,
    }
}

#[async_trait]
impl AsyncSubscriber for AlertManager {
    async fn notify(&self, alert: &Alert) -> Result<(), String> {
        let data = serde_json::to_value(&alert.data).expect("BTreeMap<String, Value> serialization is infallible");
        let record = AlertRecord {
            id: 0,
            header: alert.header.clone(),
            description: alert.description.clone(),
            source: alert.source.clone(),
            source_type: alert.source_type.clone(),
            source_deleted: false,
            timestamp: alert.timestamp,
            data,
        };
        let inserted = self.repo.insert(record).await.map_err(|e| e.to_string())?;
        self.subject
            .send(ManagedAlert {
                id: inserted.id,
                alert: alert.clone(),
                source_deleted: inserted.source_deleted,
            })
            .await;
        Ok(())
    }

    async fn clean_up(&self) {}
}
