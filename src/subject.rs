//! Reactive stream primitives (spec §4.1): a multicast `Subject<T, E>`, the
//! `Observer` contract, an idempotent `Subscription` handle, and an adapter
//! that lifts a blocking callable onto the async runtime's thread pool.
//!
//! This is deliberately push-based (observers are called, they don't poll),
//! matching `aioreactive.AsyncSubject` in the original implementation
//! (`examples/original_source/packages/sentinel-server/sentinel_server/video/__init__.py`,
//! `ReactiveVideoStream`/`ReactiveEmitter`) rather than `kube_runtime`'s
//! pull-based `async-broadcast` dispatcher — the spec's `send` must await
//! each observer in turn (§4.1/§5), which a push model gives for free and a
//! poll-based broadcast channel does not.
//!
//! Ownership follows design note §9: the `Subject` strongly owns its
//! observer slots; a [`Subscription`] holds only a [`std::sync::Weak`]
//! reference back to the subject plus a slot index, so a dangling handle
//! can never resurrect a dropped subject.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Push-based observer of a [`Subject`]. All three methods may suspend.
///
/// Errors raised by `on_next` must not be allowed to cancel sibling
/// observers (spec §4.1); callers of `Subject::send` are responsible for
/// catching and reporting per their own error policy, since the observer
/// implementation itself decides what "raised" even means in Rust (a
/// `Result::Err` return, typically).
#[async_trait]
pub trait Observer<T, E>: Send + Sync
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// A new value was produced.
    async fn on_next(&self, value: Arc<T>);
    /// The source failed; no further `on_next` calls will follow unless the
    /// subject is reused by a fresh `send`, depending on policy (spec §9
    /// leaves "is an error terminal per-subject" a driver decision — see
    /// [`crate::video_stream`] for the chosen policy).
    async fn on_error(&self, error: E);
    /// The source completed normally.
    async fn on_close(&self);
}

enum Slot<T, E> {
    Empty,
    Occupied(Arc<dyn Observer<T, E>>),
}

enum State {
    Open,
    Errored,
    Closed,
}

struct Inner<T, E> {
    state: State,
    observers: Vec<Slot<T, E>>,
}

/// A multicast channel of `T`, terminating in an error `E` or a close.
///
/// Observers subscribed before the first `send` see every value in order;
/// observers subscribed afterwards only see values from that point on
/// (spec §4.1). `Subject` is cheaply clonable; every clone shares the same
/// backing state.
pub struct Subject<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> Default for Subject<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Subject<T, E>
where
    T: Send + Sync + 'static,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Creates an open subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Open,
                observers: Vec::new(),
            })),
        }
    }

    /// Registers `observer`. If the subject has already errored or closed,
    /// the observer is notified immediately and no live subscription is
    /// returned (spec §4.1: "further subscriptions attach immediately in a
    /// closed state").
    pub async fn subscribe(&self, observer: Arc<dyn Observer<T, E>>) -> Subscription<T, E> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Open => {
                let index = inner.observers.len();
                inner.observers.push(Slot::Occupied(observer));
                Subscription {
                    subject: Arc::downgrade(&self.inner),
                    index: Some(index),
                }
            }
            State::Errored => {
                drop(inner);
                // Best-effort: we don't retain the original error value past
                // the terminal transition, so replay a close instead. Callers
                // that need the original error should inspect it at `throw`
                // time; late subscribers only need to know the stream is dead.
                observer.on_close().await;
                Subscription {
                    subject: Weak::new(),
                    index: None,
                }
            }
            State::Closed => {
                drop(inner);
                observer.on_close().await;
                Subscription {
                    subject: Weak::new(),
                    index: None,
                }
            }
        }
    }

    /// Fans `value` out to every current observer, awaiting each in turn.
    /// A no-op once the subject has errored or closed.
    pub async fn send(&self, value: T) {
        let inner = self.inner.lock().await;
        if !matches!(inner.state, State::Open) {
            return;
        }
        let value = Arc::new(value);
        // Snapshot the occupied observers so a subscribe/dispose during
        // delivery (which would otherwise need to re-enter the lock) can't
        // happen: we hold the lock for the whole fan-out, matching the
        // spec's "two send calls on the same subject are serialised by
        // construction" guarantee.
        for slot in &inner.observers {
            if let Slot::Occupied(observer) = slot {
                observer.on_next(value.clone()).await;
            }
        }
    }

    /// Notifies every current observer of a terminal error, then moves the
    /// subject into the errored state. Subsequent `send`s are dropped and
    /// subsequent `subscribe`s attach already-closed.
    pub async fn throw(&self, error: E) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, State::Open) {
            return;
        }
        for slot in &inner.observers {
            if let Slot::Occupied(observer) = slot {
                observer.on_error(error.clone()).await;
            }
        }
        inner.state = State::Errored;
        inner.observers.clear();
    }

    /// Notifies every current observer of completion, then moves the
    /// subject into the closed state. Idempotent.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if !matches!(inner.state, State::Open) {
            return;
        }
        for slot in &inner.observers {
            if let Slot::Occupied(observer) = slot {
                observer.on_close().await;
            }
        }
        inner.state = State::Closed;
        inner.observers.clear();
    }

    /// Number of currently-live observer slots. Exposed for tests and
    /// diagnostics only.
    #[must_use]
    pub async fn observer_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner
            .observers
            .iter()
            .filter(|s| matches!(s, Slot::Occupied(_)))
            .count()
    }
}

/// An idempotent disposer that severs exactly one observer's connection to
/// one [`Subject`], without affecting peers (spec §3 / glossary).
///
/// Holds only a weak reference to the subject's backing state, so dropping
/// every `Subject` clone while subscriptions are still outstanding simply
/// makes `dispose` a no-op rather than reviving dead state.
pub struct Subscription<T, E> {
    subject: Weak<Mutex<Inner<T, E>>>,
    index: Option<usize>,
}

impl<T, E> Subscription<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Disposes the subscription. Safe to call more than once; the second
    /// and later calls are no-ops.
    pub async fn dispose(&mut self) {
        let Some(index) = self.index.take() else {
            return;
        };
        let Some(subject) = self.subject.upgrade() else {
            return;
        };
        let mut inner = subject.lock().await;
        if let Some(slot) = inner.observers.get_mut(index) {
            *slot = Slot::Empty;
        }
    }
}

/// Wraps a blocking callable so that calling it from async code offloads the
/// call to the Tokio blocking thread pool instead of stalling the
/// single-threaded orchestration scheduler (spec §4.1 / §5). This is the
/// direct analogue of `sentinel_server.tasks.run_in_thread`
/// (`examples/original_source/packages/sentinel-server/sentinel_server/tasks.py`).
pub async fn offload_blocking<F, R>(f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(join_err) => std::panic::resume_unwind(join_err.into_panic()),
    }
}
