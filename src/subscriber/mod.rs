//! Subscriber contracts, the subscription registrar, and `SubscriberManager`
//! (spec §4.6).

pub mod manager;
pub mod registrar;

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::Alert;
use crate::subject::offload_blocking;

pub use manager::{ManagedSubscriber, SubscriberManager, SubscriberStatus};
pub use registrar::SubscriptionRegistrar;

/// Protocol for raw asynchronous alert subscribers (spec §6).
#[async_trait]
pub trait AsyncSubscriber: Send + Sync {
    /// Delivers one alert. A raised error is logged and swallowed by the
    /// reactive-subscriber adapter (spec §7); it never propagates to peers.
    async fn notify(&self, alert: &Alert) -> Result<(), String>;
    /// Releases any resources held by the subscriber (socket, file handle, ...).
    async fn clean_up(&self);
}

/// Protocol for raw synchronous (blocking) alert subscribers (spec §6).
pub trait SyncSubscriber: Send + Sync {
    /// Blocking equivalent of [`AsyncSubscriber::notify`].
    fn notify(&self, alert: &Alert) -> Result<(), String>;
    /// Blocking equivalent of [`AsyncSubscriber::clean_up`].
    fn clean_up(&self);
}

/// Lifts a [`SyncSubscriber`] into an [`AsyncSubscriber`] by offloading
/// every call to the Tokio blocking thread pool (spec §4.6: "sync
/// subscribers are pre-adapted").
pub struct SyncSubscriberAdapter {
    inner: Arc<dyn SyncSubscriber>,
}

impl SyncSubscriberAdapter {
    #[must_use]
    pub fn new(inner: Arc<dyn SyncSubscriber>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AsyncSubscriber for SyncSubscriberAdapter {
    async fn notify(&self, alert: &Alert) -> Result<(), String> {
        let inner = self.inner.clone();
        let alert = alert.clone();
        offload_blocking(move || inner.notify(&alert)).await
    }

    async fn clean_up(&self) {
        let inner = self.inner.clone();
        offload_blocking(move || inner.clean_up()).await;
    }
}
