//! `SubscriptionRegistrar`: the bipartite emitter/subscriber graph engine
//! (spec §4.6).
//!
//! Grounded directly in `SubscriptionRegistrar` from
//! `examples/original_source/packages/sentinel-server/sentinel_server/alert/__init__.py`.
//! Each emitter gets its own internal `Subject<Alert, Infallible>`, pumped by
//! a driver task that repeatedly calls `Emitter::next_alert` — the same
//! "subject fed by a polling driver task" shape as [`crate::video_stream::ReactiveVideoStream`],
//! reused here instead of inventing a second multicast primitive.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::model::Alert;
use crate::subject::{Observer, Subject, Subscription};
use crate::subscriber::AsyncSubscriber;
use crate::task::CancelableJoinHandle;

/// Identity of one registered emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EmitterId(pub i64);

/// Identity of one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub i64);

/// Source of alerts the registrar drives (spec §4.8's `Emitter` contract).
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Dequeues the next alert, suspending while the internal queue is empty.
    async fn next_alert(&self) -> Alert;
}

struct ObserverAdapter {
    subscriber: Arc<dyn AsyncSubscriber>,
}

#[async_trait]
impl Observer<Alert, Infallible> for ObserverAdapter {
    async fn on_next(&self, value: Arc<Alert>) {
        if let Err(message) = self.subscriber.notify(&value).await {
            // Spec §7: subscriber delivery exceptions are logged and
            // swallowed; the alert is still considered delivered for
            // ordering purposes.
            tracing::warn!(error = %message, "subscriber notify failed");
        }
    }

    async fn on_error(&self, _error: Infallible) {}

    async fn on_close(&self) {}
}

struct EmitterEntry {
    subject: Subject<Alert, Infallible>,
    _driver: CancelableJoinHandle<()>,
}

/// Wires every registered emitter to every registered subscriber, keeping
/// exactly one subscription handle per `(emitter, subscriber)` pair.
#[derive(Default)]
pub struct SubscriptionRegistrar {
    emitters: Mutex<HashMap<EmitterId, EmitterEntry>>,
    subscribers: Mutex<HashMap<SubscriberId, Arc<dyn AsyncSubscriber>>>,
    subscriptions: Mutex<HashMap<(EmitterId, SubscriberId), Subscription<Alert, Infallible>>>,
}

impl SubscriptionRegistrar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `emitter` under `id`, starts its driver task, and attaches
    /// every currently-registered subscriber to it. Asserts `id` is not
    /// already registered (spec §7: double-registration is a programmer
    /// error).
    pub async fn add_emitter(&self, id: EmitterId, emitter: Arc<dyn Emitter>) {
        let subject: Subject<Alert, Infallible> = Subject::new();
        {
            let emitters = self.emitters.lock();
            assert!(!emitters.contains_key(&id), "emitter {id:?} already registered");
        }

        let driver_subject = subject.clone();
        let driver = CancelableJoinHandle::spawn(async move {
            loop {
                let alert = emitter.next_alert().await;
                driver_subject.send(alert).await;
            }
        });

        self.emitters.lock().insert(
            id,
            EmitterEntry {
                subject: subject.clone(),
                _driver: driver,
            },
        );

        let subscriber_ids: Vec<(SubscriberId, Arc<dyn AsyncSubscriber>)> = self
            .subscribers
            .lock()
            .iter()
            .map(|(sid, s)| (*sid, s.clone()))
            .collect();
        for (sid, subscriber) in subscriber_ids {
            let sub = subject.subscribe(Arc::new(ObserverAdapter { subscriber })).await;
            self.subscriptions.lock().insert((id, sid), sub);
        }
    }

    /// Registers `subscriber` under `id` and attaches it to every
    /// currently-registered emitter. Asserts `id` is not already registered.
    pub async fn add_subscriber(&self, id: SubscriberId, subscriber: Arc<dyn AsyncSubscriber>) {
        {
            let subscribers = self.subscribers.lock();
            assert!(!subscribers.contains_key(&id), "subscriber {id:?} already registered");
        }
        self.subscribers.lock().insert(id, subscriber.clone());

        let emitter_subjects: Vec<(EmitterId, Subject<Alert, Infallible>)> = self
            .emitters
            .lock()
            .iter()
            .map(|(eid, e)| (*eid, e.subject.clone()))
            .collect();
        for (eid, subject) in emitter_subjects {
            let sub = subject
                .subscribe(Arc::new(ObserverAdapter {
                    subscriber: subscriber.clone(),
                }))
                .await;
            self.subscriptions.lock().insert((eid, id), sub);
        }
    }

    /// Disposes every subscription mentioning `id`, then removes the
    /// emitter (dropping its driver task, which aborts it).
    pub async fn remove_emitter(&self, id: EmitterId) {
        let pairs: Vec<(EmitterId, SubscriberId)> = self
            .subscriptions
            .lock()
            .keys()
            .filter(|(eid, _)| *eid == id)
            .copied()
            .collect();
        for pair in pairs {
            if let Some(mut sub) = self.subscriptions.lock().remove(&pair) {
                sub.dispose().await;
            }
        }
        self.emitters.lock().remove(&id);
    }

    /// Disposes every subscription mentioning `id`, then removes the subscriber.
    pub async fn remove_subscriber(&self, id: SubscriberId) {
        let pairs: Vec<(EmitterId, SubscriberId)> = self
            .subscriptions
            .lock()
            .keys()
            .filter(|(_, sid)| *sid == id)
            .copied()
            .collect();
        for pair in pairs {
            if let Some(mut sub) = self.subscriptions.lock().remove(&pair) {
                sub.dispose().await;
            }
        }
        self.subscribers.lock().remove(&id);
    }

    /// Number of live `(emitter, subscriber)` subscription pairs. Exposed
    /// for tests.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    struct QueueEmitter {
        queue: AsyncMutex<tokio::sync::mpsc::UnboundedReceiver<Alert>>,
    }

    #[async_trait]
    impl Emitter for QueueEmitter {
        async fn next_alert(&self) -> Alert {
            self.queue.lock().await.recv().await.expect("sender dropped")
        }
    }

    fn sample_alert(detail: &str) -> Alert {
        Alert::camera_alert(detail, &[], chrono::Utc::now())
    }

    struct RecordingSubscriber {
        received: Arc<SyncMutex<Vec<Alert>>>,
        fail_next: Arc<SyncMutex<bool>>,
    }

    #[async_trait]
    impl AsyncSubscriber for RecordingSubscriber {
        async fn notify(&self, alert: &Alert) -> Result<(), String> {
            if *self.fail_next.lock() {
                *self.fail_next.lock() = false;
                return Err("boom".to_string());
            }
            self.received.lock().push(alert.clone());
            Ok(())
        }

        async fn clean_up(&self) {}
    }

    #[tokio::test]
    async fn adding_an_emitter_attaches_every_current_subscriber() {
        let registrar = SubscriptionRegistrar::new();
        let received = Arc::new(SyncMutex::new(Vec::new()));
        registrar
            .add_subscriber(
                SubscriberId(1),
                Arc::new(RecordingSubscriber {
                    received: received.clone(),
                    fail_next: Arc::new(SyncMutex::new(false)),
                }),
            )
            .await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        registrar
            .add_emitter(EmitterId(1), Arc::new(QueueEmitter { queue: AsyncMutex::new(rx) }))
            .await;
        tx.send(sample_alert("cam")).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.lock().len(), 1);
        assert_eq!(registrar.subscription_count(), 1);
    }

    #[tokio::test]
    async fn adding_a_subscriber_attaches_to_every_current_emitter() {
        let registrar = SubscriptionRegistrar::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        registrar
            .add_emitter(EmitterId(1), Arc::new(QueueEmitter { queue: AsyncMutex::new(rx) }))
            .await;

        let received = Arc::new(SyncMutex::new(Vec::new()));
        registrar
            .add_subscriber(
                SubscriberId(1),
                Arc::new(RecordingSubscriber {
                    received: received.clone(),
                    fail_next: Arc::new(SyncMutex::new(false)),
                }),
            )
            .await;

        tx.send(sample_alert("cam")).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test]
    async fn removing_an_emitter_disposes_its_subscriptions_only() {
        let registrar = SubscriptionRegistrar::new();
        let received = Arc::new(SyncMutex::new(Vec::new()));
        registrar
            .add_subscriber(
                SubscriberId(1),
                Arc::new(RecordingSubscriber {
                    received: received.clone(),
                    fail_next: Arc::new(SyncMutex::new(false)),
                }),
            )
            .await;
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        registrar
            .add_emitter(EmitterId(1), Arc::new(QueueEmitter { queue: AsyncMutex::new(rx) }))
            .await;

        registrar.remove_emitter(EmitterId(1)).await;
        assert_eq!(registrar.subscription_count(), 0);
        drop(tx);
    }

    #[tokio::test]
    async fn one_subscriber_raising_does_not_block_delivery_to_the_other() {
        let registrar = SubscriptionRegistrar::new();
        let failing_received = Arc::new(SyncMutex::new(Vec::new()));
        let ok_received = Arc::new(SyncMutex::new(Vec::new()));
        registrar
            .add_subscriber(
                SubscriberId(1),
                Arc::new(RecordingSubscriber {
                    received: failing_received.clone(),
                    fail_next: Arc::new(SyncMutex::new(true)),
                }),
            )
            .await;
        registrar
            .add_subscriber(
                SubscriberId(2),
                Arc::new(RecordingSubscriber {
                    received: ok_received.clone(),
                    fail_next: Arc::new(SyncMutex::new(false)),
                }),
            )
            .await;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        registrar
            .add_emitter(EmitterId(1), Arc::new(QueueEmitter { queue: AsyncMutex::new(rx) }))
            .await;
        tx.send(sample_alert("cam")).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(failing_received.lock().is_empty());
        assert_eq!(ok_received.lock().len(), 1);
    }
}
