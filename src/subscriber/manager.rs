//! `SubscriberManager`: persists subscriber definitions and mirrors
//! `VideoSourceManager`'s lifecycle, minus video-stream/detector specifics
//! (spec §4.6).
//!
//! Grounded in `SubscriberManager` from
//! `examples/original_source/packages/sentinel-server/sentinel_server/alert/__init__.py`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::SubscriberError;
use crate::plugin::{Constructed, ComponentDescriptor, ComponentKind, PluginRegistry, RawSyncComponent, ConstructedComponent};
use crate::store::{SubscriberRecord, SubscriberRepository};
use crate::subscriber::registrar::{SubscriberId, SubscriptionRegistrar};
use crate::subscriber::{AsyncSubscriber, SyncSubscriberAdapter};

/// Runtime status of a [`ManagedSubscriber`] (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberStatus {
    Ok,
    Error,
}

/// A subscriber entity as exposed to callers: persisted fields plus runtime status.
#[derive(Debug, Clone)]
pub struct ManagedSubscriber {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub plugin_name: String,
    pub component_name: String,
    pub config: Value,
    pub status: SubscriberStatus,
}

struct Entry {
    record: SubscriberRecord,
    status: SubscriberStatus,
    live: Option<Arc<dyn AsyncSubscriber>>,
}

impl Entry {
    fn view(&self) -> ManagedSubscriber {
        ManagedSubscriber {
            id: self.record.id,
            name: self.record.name.clone(),
            enabled: self.record.enabled,
            plugin_name: self.record.plugin_name.clone(),
            component_name: self.record.component_name.clone(),
            config: self.record.config.clone(),
            status: self.status,
        }
    }
}

/// Owns subscriber entities and mediates their lifecycle, deregistering
/// (never deleting) the registrar-side subscription when a subscriber is
/// disabled, and re-instantiating it on a later enable.
pub struct SubscriberManager {
    repo: Arc<dyn SubscriberRepository>,
    plugins: Arc<PluginRegistry>,
    registrar: Arc<SubscriptionRegistrar>,
    entries: RwLock<HashMap<i64, Entry>>,
}

impl SubscriberManager {
    #[must_use]
    pub fn new(
        repo: Arc<dyn SubscriberRepository>,
        plugins: Arc<PluginRegistry>,
        registrar: Arc<SubscriptionRegistrar>,
    ) -> Self {
        Self {
            repo,
            plugins,
            registrar,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Persists a new, disabled subscriber definition.
    pub async fn create(
        &self,
        name: impl Into<String>,
        plugin_name: impl Into<String>,
        component_name: impl Into<String>,
        config: Value,
    ) -> Result<ManagedSubscriber, SubscriberError> {
        let record = self
            .repo
            .insert(SubscriberRecord {
                id: 0,
                name: name.into(),
                enabled: false,
                plugin_name: plugin_name.into(),
                component_name: component_name.into(),
                config,
            })
            .await?;
        let view = ManagedSubscriber {
            id: record.id,
            name: record.name.clone(),
            enabled: record.enabled,
            plugin_name: record.plugin_name.clone(),
            component_name: record.component_name.clone(),
            config: record.config.clone(),
            status: SubscriberStatus::Ok,
        };
        self.entries.write().insert(
            record.id,
            Entry {
                record,
                status: SubscriberStatus::Ok,
                live: None,
            },
        );
        Ok(view)
    }

    /// Restores every persisted subscriber at startup, attempting to enable
    /// those with `enabled=true` (spec §3's persistence round-trip invariant).
    pub async fn load_from_db(&self) -> Result<(), SubscriberError> {
        let records = self.repo.all().await?;
        for record in records {
            let id = record.id;
            let enabled = record.enabled;
            self.entries.write().insert(
                id,
                Entry {
                    record,
                    status: SubscriberStatus::Ok,
                    live: None,
                },
            );
            if enabled {
                self.bring_live(id).await;
            }
        }
        Ok(())
    }

    /// Enables a subscriber: instantiates its raw component and registers it
    /// with the registrar. Idempotent if already enabled and live.
    pub async fn enable(&self, id: i64) -> Result<(), SubscriberError> {
        let already_live = self
            .entries
            .read()
            .get(&id)
            .map(|e| e.record.enabled && e.live.is_some())
            .unwrap_or(false);
        if already_live {
            return Ok(());
        }

        {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(SubscriberError::NotFound(id))?;
            entry.record.enabled = true;
        }
        let record = self.entries.read().get(&id).ok_or(SubscriberError::NotFound(id))?.record.clone();
        self.repo.update(record).await?;

        self.bring_live(id).await;
        Ok(())
    }

    async fn bring_live(&self, id: i64) {
        let (plugin_name, component_name, config) = {
            let entries = self.entries.read();
            let Some(entry) = entries.get(&id) else { return };
            (
                entry.record.plugin_name.clone(),
                entry.record.component_name.clone(),
                entry.record.config.clone(),
            )
        };

        let descriptor = self.plugins.find_component(&plugin_name, &component_name);
        let handle = descriptor.and_then(|d: ComponentDescriptor| Self::instantiate(&d, config).ok());

        match handle {
            Some(handle) => {
                self.registrar.add_subscriber(SubscriberId(id), handle.clone()).await;
                if let Some(entry) = self.entries.write().get_mut(&id) {
                    entry.live = Some(handle);
                    entry.status = SubscriberStatus::Ok;
                }
            }
            None => {
                if let Some(entry) = self.entries.write().get_mut(&id) {
                    entry.live = None;
                    entry.status = SubscriberStatus::Error;
                }
            }
        }
    }

    fn instantiate(descriptor: &ComponentDescriptor, config: Value) -> Result<Arc<dyn AsyncSubscriber>, String> {
        if !matches!(
            descriptor.kind,
            ComponentKind::AsyncSubscriber | ComponentKind::SyncSubscriber
        ) {
            return Err(format!("descriptor {} is not a subscriber kind", descriptor.display_name));
        }
        match descriptor.build(config)? {
            Constructed::Async(ConstructedComponent::Subscriber(s)) => Ok(s),
            Constructed::Sync(RawSyncComponent::Subscriber(s)) => Ok(Arc::new(SyncSubscriberAdapter::new(s))),
            _ => Err("descriptor did not construct a subscriber".to_string()),
        }
    }

    /// Disables a subscriber: deregisters it from the registrar (which
    /// disposes its subscriptions) and releases its raw handle. Idempotent.
    pub async fn disable(&self, id: i64) -> Result<(), SubscriberError> {
        let live = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(SubscriberError::NotFound(id))?;
            entry.record.enabled = false;
            entry.live.take()
        };
        let record = self.entries.read().get(&id).ok_or(SubscriberError::NotFound(id))?.record.clone();
        self.repo.update(record).await?;

        if let Some(handle) = live {
            self.registrar.remove_subscriber(SubscriberId(id)).await;
            handle.clean_up().await;
        }
        Ok(())
    }

    /// Disables (if enabled) and permanently removes a subscriber.
    pub async fn delete(&self, id: i64) -> Result<(), SubscriberError> {
        self.disable(id).await.ok();
        self.repo.delete(id).await?;
        self.entries.write().remove(&id);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<ManagedSubscriber> {
        self.entries.read().get(&id).map(Entry::view)
    }

    #[must_use]
    pub fn list(&self) -> Vec<ManagedSubscriber> {
        self.entries.read().values().map(Entry::view).collect()
    }

    /// Subscriber-kind components available for UI selection (spec §4.6).
    #[must_use]
    pub fn available_components(&self) -> Vec<ComponentDescriptor> {
        self.plugins.search(|d| {
            matches!(d.kind, ComponentKind::AsyncSubscriber | ComponentKind::SyncSubscriber)
        })
    }
}
