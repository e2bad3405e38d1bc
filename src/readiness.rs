//! One-shot readiness signals used to enforce the global init order from
//! spec §5: `config -> plugin_manager -> {alert_manager, subscription_registrar}
//! -> {video_source_manager, subscriber_manager} -> *_loaded_from_db`.
//!
//! Directly grounded in `kube_runtime::shared_store::ready_token::ReadyToken`
//! (a `parking_lot::RwLock<Vec<ReadyState>>` that's "ready" once every child
//! is), extended with an async `wait` so [`crate::lifecycle`] can actually
//! block a later init stage on an earlier one instead of only polling.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// A single one-shot readiness flag. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct ReadyState {
    ready: Arc<RwLock<bool>>,
    notify: Arc<Notify>,
}

impl ReadyState {
    fn new() -> Self {
        Self {
            ready: Arc::new(RwLock::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Marks this stage as ready, waking anyone awaiting it. Idempotent.
    pub fn ready(&self) {
        *self.ready.write() = true;
        self.notify.notify_waiters();
    }

    /// True once [`ReadyState::ready`] has been called.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.ready.read()
    }

    /// Suspends until this stage is ready.
    pub async fn wait(&self) {
        loop {
            if self.is_ready() {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after subscribing to avoid missing a `ready()` that
            // ran between the check above and registering the waiter.
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}

/// Tracks readiness of an arbitrary number of child stages. A `ReadyToken`
/// with no children is vacuously ready.
#[derive(Clone, Default)]
pub struct ReadyToken(Arc<RwLock<Vec<ReadyState>>>);

impl ReadyToken {
    /// Creates an empty token.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(Vec::new())))
    }

    /// True once every registered child is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.read().iter().all(ReadyState::is_ready)
    }

    /// Registers and returns a new child readiness flag.
    pub fn child(&self) -> ReadyState {
        let state = ReadyState::new();
        self.0.write().push(state.clone());
        state
    }

    /// Suspends until every registered child is ready.
    pub async fn wait_all(&self) {
        // Snapshot under the lock, then await outside it: children never
        // shrink, so this can't race with a later `child()` call losing us
        // a wakeup.
        let children: Vec<ReadyState> = self.0.read().clone();
        for child in children {
            child.wait().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn vacuous_token_is_ready() {
        assert!(ReadyToken::new().is_ready());
    }

    #[test]
    fn token_with_unready_child_is_not_ready() {
        let token = ReadyToken::new();
        let _child = token.child();
        assert!(!token.is_ready());
    }

    #[test]
    fn token_becomes_ready_once_all_children_are() {
        let token = ReadyToken::new();
        let a = token.child();
        let b = token.child();
        a.ready();
        assert!(!token.is_ready());
        b.ready();
        assert!(token.is_ready());
    }

    #[tokio::test]
    async fn wait_all_unblocks_once_every_child_signals() {
        let token = ReadyToken::new();
        let a = token.child();
        let b = token.child();

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move {
                token.wait_all().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        a.ready();
        tokio::time::sleep(Duration::from_millis(5)).await;
        b.ready();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_all should unblock after both children are ready")
            .unwrap();
    }
}
