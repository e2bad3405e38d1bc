//! Raw video-stream contracts and [`ReactiveVideoStream`] (spec §4.3).
//!
//! Grounded in `ReactiveVideoStream` from
//! `examples/original_source/packages/sentinel-server/sentinel_server/video/__init__.py`,
//! restructured for Rust's ownership model: the original's `self._run`
//! boolean flag can't actually cancel an in-flight `await next_frame()` (a
//! Python coroutine only checks the flag between loop iterations), which the
//! spec explicitly calls out as a hard requirement ("Calling stop while
//! start is awaiting next_frame MUST cancel that await"). Here that's done
//! with `tokio::select!` racing the pull against a one-shot stop signal, the
//! same cancellation idiom `kube_runtime::utils::CancelableJoinHandle`
//! documents for driver tasks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::oneshot;

use crate::model::Frame;
use crate::subject::{offload_blocking, Observer, Subject, Subscription};

/// Terminal signal carried by a [`ReactiveVideoStream`]'s subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The raw stream returned no frame (end of stream / transient read failure).
    ///
    /// Per spec §9's recommended policy, this is terminal for the subject:
    /// the owning [`crate::video_source::VideoSourceManager`] observes the
    /// driver task's completion and transitions the source to `Error`,
    /// rather than relying on the subject to keep delivering afterward.
    NoData,
}

/// Protocol for raw asynchronous video streams (spec §6).
#[async_trait]
pub trait AsyncVideoStream: Send {
    /// Pulls the next frame, or `None` at end-of-stream / on a transient read failure.
    async fn next_frame(&mut self) -> Option<Frame>;
    /// Releases any resources held by the stream (camera handle, decoder, socket, ...).
    async fn clean_up(&mut self);
}

/// Protocol for raw synchronous (blocking) video streams (spec §6).
pub trait SyncVideoStream: Send {
    /// Blocking equivalent of [`AsyncVideoStream::next_frame`].
    fn next_frame(&mut self) -> Option<Frame>;
    /// Blocking equivalent of [`AsyncVideoStream::clean_up`].
    fn clean_up(&mut self);
}

/// Lifts a [`SyncVideoStream`] into an [`AsyncVideoStream`] by offloading
/// every call to the Tokio blocking thread pool (spec §4.1's sync->async adapter).
pub struct SyncVideoStreamAdapter {
    inner: Option<Box<dyn SyncVideoStream>>,
}

impl SyncVideoStreamAdapter {
    /// Wraps a boxed synchronous video stream.
    #[must_use]
    pub fn new(inner: Box<dyn SyncVideoStream>) -> Self {
        Self { inner: Some(inner) }
    }
}

#[async_trait]
impl AsyncVideoStream for SyncVideoStreamAdapter {
    async fn next_frame(&mut self) -> Option<Frame> {
        let mut inner = self
            .inner
            .take()
            .expect("SyncVideoStreamAdapter used after clean_up");
        let (frame, inner) = offload_blocking(move || {
            let frame = inner.next_frame();
            (frame, inner)
        })
        .await;
        self.inner = Some(inner);
        frame
    }

    async fn clean_up(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            offload_blocking(move || inner.clean_up()).await;
        }
    }
}

/// Pulls frames from a raw video stream in a loop and multicasts them.
///
/// One instance is owned exclusively by one [`crate::video_source::VideoSource`]
/// while it is live (spec §5's shared-resource policy). The driver loop
/// itself (`run`) is spawned as a separate task by the owner so it can be
/// cancelled independently; `ReactiveVideoStream` only holds the shared
/// `Subject` and the stop signal, not the task handle.
pub struct ReactiveVideoStream {
    subject: Subject<Frame, StreamError>,
    stop_tx: SyncMutex<Option<oneshot::Sender<()>>>,
}

impl Default for ReactiveVideoStream {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveVideoStream {
    /// Creates a stream with a fresh, open subject.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subject: Subject::new(),
            stop_tx: SyncMutex::new(None),
        }
    }

    /// The underlying multicast subject of frames, shared with e.g. [`crate::detector::ReactiveDetector`].
    #[must_use]
    pub fn subject(&self) -> Subject<Frame, StreamError> {
        self.subject.clone()
    }

    /// Registers an observer for frames emitted by this stream.
    pub async fn subscribe(
        &self,
        observer: Arc<dyn Observer<Frame, StreamError>>,
    ) -> Subscription<Frame, StreamError> {
        self.subject.subscribe(observer).await
    }

    /// Runs the pull loop: awaits `next_frame()` and sends it, or throws
    /// `StreamError::NoData` on end-of-stream, repeating until `request_stop`
    /// is called. On exit, always cleans up the raw stream and closes the
    /// subject — this is the method callers spawn as the per-source driver task.
    pub async fn run(&self, mut raw: Box<dyn AsyncVideoStream>) {
        let (tx, rx) = oneshot::channel();
        *self.stop_tx.lock() = Some(tx);
        tokio::pin!(rx);

        loop {
            tokio::select! {
                _ = &mut rx => break,
                frame = raw.next_frame() => {
                    match frame {
                        Some(frame) => self.subject.send(frame).await,
                        None => {
                            // Spec §4.3: the loop continues even after throwing;
                            // downstream consumers observe the terminal subject
                            // state via on_error and the owning manager decides
                            // whether to tear the pipeline down.
                            self.subject.throw(StreamError::NoData).await;
                        }
                    }
                }
            }
        }

        raw.clean_up().await;
        self.subject.close().await;
    }

    /// Requests that the running `run()` loop stop. Cancels an in-flight
    /// `next_frame()` await immediately; cleanup and subject closure happen
    /// inside `run()` after it returns from `select!`. No-op if `run()` is
    /// not currently active.
    pub fn request_stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Owns a spawned [`ReactiveVideoStream::run`] driver task and the means to
/// stop it, bundling "signal stop" + "await completion" the way spec §4.3's
/// `stop()` does conceptually (`crate::task::CancelableJoinHandle` gives
/// hard cancellation as a backstop if the loop is ever stuck, e.g. a buggy
/// plugin whose `next_frame` never returns).
pub struct VideoStreamDriver {
    stream: Arc<ReactiveVideoStream>,
    task: crate::task::CancelableJoinHandle<()>,
}

impl VideoStreamDriver {
    /// Spawns `stream.run(raw)` as a background task.
    pub fn spawn(stream: Arc<ReactiveVideoStream>, raw: Box<dyn AsyncVideoStream>) -> Self {
        let driver_stream = stream.clone();
        let task = crate::task::CancelableJoinHandle::spawn(async move {
            driver_stream.run(raw).await;
        });
        Self { stream, task }
    }

    /// Signals a graceful stop and awaits the driver task's completion.
    pub async fn stop(self) {
        self.stream.request_stop();
        let _ = self.task.await;
    }
}

impl Future for VideoStreamDriver {
    type Output = Result<(), tokio::task::JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<Self::Output> {
        Pin::new(&mut self.task).poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Frame;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::Arc;
    use std::time::Duration;

    struct ScriptedStream {
        frames: std::vec::IntoIter<Option<Frame>>,
        cleaned_up: Arc<SyncMutex<bool>>,
    }

    #[async_trait]
    impl AsyncVideoStream for ScriptedStream {
        async fn next_frame(&mut self) -> Option<Frame> {
            self.frames.next().flatten()
        }

        async fn clean_up(&mut self) {
            *self.cleaned_up.lock() = true;
        }
    }

    struct HangingStream;

    #[async_trait]
    impl AsyncVideoStream for HangingStream {
        async fn next_frame(&mut self) -> Option<Frame> {
            futures::future::pending().await
        }

        async fn clean_up(&mut self) {}
    }

    struct Collector {
        frames: Arc<SyncMutex<Vec<Frame>>>,
        errors: Arc<SyncMutex<Vec<StreamError>>>,
    }

    #[async_trait]
    impl Observer<Frame, StreamError> for Collector {
        async fn on_next(&self, value: Arc<Frame>) {
            self.frames.lock().push((*value).clone());
        }

        async fn on_error(&self, error: StreamError) {
            self.errors.lock().push(error);
        }

        async fn on_close(&self) {}
    }

    fn tiny_frame(n: u8) -> Frame {
        Frame::new(1, 1, 1, vec![n], Some(n as i64))
    }

    #[tokio::test]
    async fn delivers_frames_in_capture_order_then_closes_when_source_exhausted() {
        let stream = Arc::new(ReactiveVideoStream::new());
        let frames = Arc::new(SyncMutex::new(Vec::new()));
        let errors = Arc::new(SyncMutex::new(Vec::new()));
        let collector = Arc::new(Collector {
            frames: frames.clone(),
            errors: errors.clone(),
        });
        let _sub = stream.subscribe(collector).await;

        let raw = Box::new(ScriptedStream {
            frames: vec![Some(tiny_frame(1)), Some(tiny_frame(2)), None].into_iter(),
            cleaned_up: Arc::new(SyncMutex::new(false)),
        });

        let driver = VideoStreamDriver::spawn(stream.clone(), raw);
        // The third scripted value is `None`, which throws; `run` then loops
        // forever on `frames.next()` returning `None` again and again unless
        // we stop it, so stop once we've observed the error.
        tokio::time::sleep(Duration::from_millis(20)).await;
        driver.stop().await;

        assert_eq!(frames.lock().iter().map(|f| f.data[0]).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(errors.lock().as_slice(), &[StreamError::NoData]);
    }

    #[tokio::test]
    async fn request_stop_cancels_an_in_flight_next_frame_await() {
        let stream = Arc::new(ReactiveVideoStream::new());
        let driver = VideoStreamDriver::spawn(stream.clone(), Box::new(HangingStream));

        tokio::time::sleep(Duration::from_millis(10)).await;
        // If request_stop could not cancel the pending next_frame().await,
        // this would hang forever since HangingStream::next_frame never resolves.
        tokio::time::timeout(Duration::from_secs(1), driver.stop())
            .await
            .expect("stop() must cancel the in-flight next_frame await");
    }

    #[tokio::test]
    async fn stop_runs_clean_up_and_closes_the_subject() {
        let stream = Arc::new(ReactiveVideoStream::new());
        let closed = Arc::new(SyncMutex::new(false));
        struct CloseObserver(Arc<SyncMutex<bool>>);
        #[async_trait]
        impl Observer<Frame, StreamError> for CloseObserver {
            async fn on_next(&self, _value: Arc<Frame>) {}
            async fn on_error(&self, _error: StreamError) {}
            async fn on_close(&self) {
                *self.0.lock() = true;
            }
        }
        let _sub = stream.subscribe(Arc::new(CloseObserver(closed.clone()))).await;

        let cleaned_up = Arc::new(SyncMutex::new(false));
        let raw = Box::new(ScriptedStream {
            frames: vec![].into_iter(),
            cleaned_up: cleaned_up.clone(),
        });
        let driver = VideoStreamDriver::spawn(stream.clone(), raw);
        tokio::time::sleep(Duration::from_millis(5)).await;
        driver.stop().await;

        assert!(*cleaned_up.lock());
        assert!(*closed.lock());
    }
}
