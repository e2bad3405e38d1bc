//! Driver-task plumbing shared by [`crate::video_stream`], [`crate::detector`]
//! and the alert emitter/registrar: a join handle that aborts its task on
//! drop, matching `kube_runtime::utils::CancelableJoinHandle`. This is what
//! makes "stop clears the run flag ... calling stop while start is awaiting
//! next_frame MUST cancel that await" (spec §4.3) cheap to implement: dropping
//! the handle (or calling `abort`) cancels the in-flight `.await` immediately.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

/// A [`JoinHandle`] that aborts its task when dropped, instead of detaching it.
pub struct CancelableJoinHandle<T> {
    inner: JoinHandle<T>,
}

impl<T> CancelableJoinHandle<T>
where
    T: Send + 'static,
{
    /// Spawns `future` on the current Tokio runtime.
    pub fn spawn(future: impl Future<Output = T> + Send + 'static) -> Self {
        Self {
            inner: tokio::spawn(future),
        }
    }

    /// Aborts the underlying task immediately, cancelling whatever `.await`
    /// it is currently suspended in.
    pub fn abort(&self) {
        self.inner.abort();
    }
}

impl<T> Drop for CancelableJoinHandle<T> {
    fn drop(&mut self) {
        self.inner.abort();
    }
}

impl<T> Future for CancelableJoinHandle<T> {
    type Output = Result<T, tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}
