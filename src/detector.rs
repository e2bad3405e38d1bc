//! Frame-to-detection-result pipeline stage (spec §4.4).
//!
//! Grounded in `ReactiveDetector` from
//! `examples/original_source/packages/sentinel-server/sentinel_server/video/detect.py`,
//! restructured as an `Observer<Frame, StreamError>` that is itself a
//! `Subject<DetectionResult, DetectorError>` — the same "subject that is
//! also an observer of its upstream" shape `kube_runtime::reflector`'s
//! `Store` uses to sit between a `watcher` stream and its own consumers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::model::{DetectionResult, Detection, Frame};
use crate::subject::{offload_blocking, Observer, Subject, Subscription};
use crate::video_stream::StreamError;

/// Consecutive single-frame `detect()` failures a [`ReactiveDetector`]
/// tolerates before treating the failure as persistent (spec §7: a
/// transient detector exception on one frame "does not by itself tear down
/// the pipeline"). Not spec-mandated as a specific count; chosen as a small
/// number that absorbs one or two bad frames without masking a genuinely
/// broken plugin.
const PERSISTENT_FAILURE_THRESHOLD: u64 = 3;

/// Terminal signal carried by a [`ReactiveDetector`]'s subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    /// The upstream video stream terminated.
    UpstreamFailed(StreamError),
    /// `detect` failed on [`PERSISTENT_FAILURE_THRESHOLD`] consecutive frames.
    DetectFailed(String),
}

/// Protocol for raw asynchronous detectors (spec §6).
#[async_trait]
pub trait AsyncDetector: Send + Sync {
    /// Runs inference against `frame`, producing zero or more detections.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, String>;
    /// Releases any resources held by the detector (model handle, GPU context, ...).
    async fn clean_up(&self);
}

/// Protocol for raw synchronous (blocking) detectors (spec §6).
pub trait SyncDetector: Send + Sync {
    /// Blocking equivalent of [`AsyncDetector::detect`].
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, String>;
    /// Blocking equivalent of [`AsyncDetector::clean_up`].
    fn clean_up(&self);
}

/// Lifts a [`SyncDetector`] into an [`AsyncDetector`] by offloading every
/// call to the Tokio blocking thread pool.
pub struct SyncDetectorAdapter {
    inner: Arc<dyn SyncDetector>,
}

impl SyncDetectorAdapter {
    /// Wraps a synchronous detector.
    #[must_use]
    pub fn new(inner: Arc<dyn SyncDetector>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AsyncDetector for SyncDetectorAdapter {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, String> {
        let inner = self.inner.clone();
        let frame = frame.clone();
        offload_blocking(move || inner.detect(&frame)).await
    }

    async fn clean_up(&self) {
        let inner = self.inner.clone();
        offload_blocking(move || inner.clean_up()).await;
    }
}

/// Consumes frames from an upstream [`crate::video_stream::ReactiveVideoStream`],
/// gates inference by a per-source detection interval, and multicasts
/// [`DetectionResult`]s.
///
/// The interval is gated on wall-clock time (`tokio::time::Instant`, so
/// tests can drive it with `tokio::time::pause`/`advance`), per spec §4.4's
/// explicit rationale: "decouples inference cadence from capture cadence"
/// would not hold if gating used the frame's own capture timestamp, since a
/// slow or bursty source would then still pay inference cost on every frame
/// it happens to emit.
pub struct ReactiveDetector {
    detector: Arc<dyn AsyncDetector>,
    interval: std::time::Duration,
    subject: Subject<DetectionResult, DetectorError>,
    last_run: parking_lot::Mutex<Option<Instant>>,
    consecutive_failures: AtomicU64,
}

impl ReactiveDetector {
    /// Creates a detector subject gating `detector` by `interval`.
    #[must_use]
    pub fn new(detector: Arc<dyn AsyncDetector>, interval: std::time::Duration) -> Self {
        Self {
            detector,
            interval,
            subject: Subject::new(),
            last_run: parking_lot::Mutex::new(None),
            consecutive_failures: AtomicU64::new(0),
        }
    }

    /// The underlying multicast subject of detection results.
    #[must_use]
    pub fn subject(&self) -> Subject<DetectionResult, DetectorError> {
        self.subject.clone()
    }

    /// Registers an observer for detection results.
    pub async fn subscribe(
        &self,
        observer: Arc<dyn Observer<DetectionResult, DetectorError>>,
    ) -> Subscription<DetectionResult, DetectorError> {
        self.subject.subscribe(observer).await
    }

    /// Releases the underlying detector. Does not close the subject; callers
    /// propagate `on_close` separately so ordering matches whatever
    /// triggered the teardown (upstream close vs. explicit stop).
    pub async fn clean_up(&self) {
        self.detector.clean_up().await;
    }

    async fn handle_frame(&self, frame: Arc<Frame>) {
        let now = Instant::now();
        let due = {
            let mut last_run = self.last_run.lock();
            let due = last_run.is_none_or(|t| now >= t + self.interval);
            if due {
                *last_run = Some(now);
            }
            due
        };

        if !due {
            self.subject
                .send(DetectionResult {
                    frame,
                    detections: Vec::new(),
                })
                .await;
            return;
        }

        match self.detector.detect(&frame).await {
            Ok(detections) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.subject.send(DetectionResult { frame, detections }).await;
            }
            Err(message) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= PERSISTENT_FAILURE_THRESHOLD {
                    tracing::warn!(error = %message, failures, "detector failed persistently, tearing down");
                    self.subject.throw(DetectorError::DetectFailed(message)).await;
                } else {
                    // Spec §7: a single bad frame is surfaced for operators but
                    // must not kill the pipeline; only sustained failure does.
                    tracing::warn!(error = %message, failures, "detector failed on a single frame, continuing");
                }
            }
        }
    }
}

#[async_trait]
impl Observer<Frame, StreamError> for ReactiveDetector {
    async fn on_next(&self, value: Arc<Frame>) {
        self.handle_frame(value).await;
    }

    async fn on_error(&self, error: StreamError) {
        self.subject.throw(DetectorError::UpstreamFailed(error)).await;
    }

    async fn on_close(&self) {
        self.clean_up().await;
        self.subject.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    fn tiny_frame() -> Frame {
        Frame::new(1, 1, 1, vec![0], None)
    }

    struct CountingDetector {
        calls: Arc<SyncMutex<u32>>,
        cleaned_up: Arc<SyncMutex<bool>>,
    }

    #[async_trait]
    impl AsyncDetector for CountingDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, String> {
            *self.calls.lock() += 1;
            Ok(vec![])
        }

        async fn clean_up(&self) {
            *self.cleaned_up.lock() = true;
        }
    }

    struct Collector {
        results: Arc<SyncMutex<Vec<DetectionResult>>>,
        closed: Arc<SyncMutex<bool>>,
    }

    #[async_trait]
    impl Observer<DetectionResult, DetectorError> for Collector {
        async fn on_next(&self, value: Arc<DetectionResult>) {
            self.results.lock().push((*value).clone());
        }

        async fn on_error(&self, _error: DetectorError) {}

        async fn on_close(&self) {
            *self.closed.lock() = true;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_inference_once_per_interval_and_emits_empty_results_between() {
        let calls = Arc::new(SyncMutex::new(0u32));
        let detector = ReactiveDetector::new(
            Arc::new(CountingDetector {
                calls: calls.clone(),
                cleaned_up: Arc::new(SyncMutex::new(false)),
            }),
            Duration::from_secs(1),
        );
        let results = Arc::new(SyncMutex::new(Vec::new()));
        let collector = Arc::new(Collector {
            results: results.clone(),
            closed: Arc::new(SyncMutex::new(false)),
        });
        let _sub = detector.subscribe(collector).await;

        detector.on_next(Arc::new(tiny_frame())).await;
        assert_eq!(*calls.lock(), 1);

        tokio::time::advance(Duration::from_millis(500)).await;
        detector.on_next(Arc::new(tiny_frame())).await;
        assert_eq!(*calls.lock(), 1, "still within the interval, inference skipped");
        assert!(results.lock()[1].detections.is_empty());

        tokio::time::advance(Duration::from_millis(600)).await;
        detector.on_next(Arc::new(tiny_frame())).await;
        assert_eq!(*calls.lock(), 2, "interval elapsed, inference runs again");
    }

    #[tokio::test]
    async fn on_close_cleans_up_the_detector_and_closes_the_subject() {
        let cleaned_up = Arc::new(SyncMutex::new(false));
        let detector = ReactiveDetector::new(
            Arc::new(CountingDetector {
                calls: Arc::new(SyncMutex::new(0)),
                cleaned_up: cleaned_up.clone(),
            }),
            Duration::from_secs(1),
        );
        let closed = Arc::new(SyncMutex::new(false));
        let collector = Arc::new(Collector {
            results: Arc::new(SyncMutex::new(Vec::new())),
            closed: closed.clone(),
        });
        let _sub = detector.subscribe(collector).await;

        detector.on_close().await;

        assert!(*cleaned_up.lock());
        assert!(*closed.lock());
    }

    #[tokio::test]
    async fn upstream_error_propagates_as_a_detector_error() {
        let detector = ReactiveDetector::new(
            Arc::new(CountingDetector {
                calls: Arc::new(SyncMutex::new(0)),
                cleaned_up: Arc::new(SyncMutex::new(false)),
            }),
            Duration::from_secs(1),
        );
        struct ErrCollector(Arc<SyncMutex<Vec<DetectorError>>>);
        #[async_trait]
        impl Observer<DetectionResult, DetectorError> for ErrCollector {
            async fn on_next(&self, _value: Arc<DetectionResult>) {}
            async fn on_error(&self, error: DetectorError) {
                self.0.lock().push(error);
            }
            async fn on_close(&self) {}
        }
        let errors = Arc::new(SyncMutex::new(Vec::new()));
        let _sub = detector.subscribe(Arc::new(ErrCollector(errors.clone()))).await;

        detector.on_error(StreamError::NoData).await;

        assert_eq!(errors.lock().as_slice(), &[DetectorError::UpstreamFailed(StreamError::NoData)]);
    }

    struct ScriptedDetector {
        outcomes: SyncMutex<std::vec::IntoIter<Result<Vec<Detection>, String>>>,
    }

    #[async_trait]
    impl AsyncDetector for ScriptedDetector {
        async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, String> {
            self.outcomes.lock().next().expect("script exhausted")
        }

        async fn clean_up(&self) {}
    }

    #[tokio::test]
    async fn a_single_failed_frame_does_not_terminate_the_subject() {
        let detector = ReactiveDetector::new(
            Arc::new(ScriptedDetector {
                outcomes: SyncMutex::new(vec![Err("plugin raised".to_string()), Ok(vec![])].into_iter()),
            }),
            Duration::from_secs(0),
        );
        let results = Arc::new(SyncMutex::new(Vec::new()));
        let errors = Arc::new(SyncMutex::new(Vec::new()));
        let collector = Arc::new(Collector {
            results: results.clone(),
            closed: Arc::new(SyncMutex::new(false)),
        });
        struct ErrCollector(Arc<SyncMutex<Vec<DetectorError>>>);
        #[async_trait]
        impl Observer<DetectionResult, DetectorError> for ErrCollector {
            async fn on_next(&self, _value: Arc<DetectionResult>) {}
            async fn on_error(&self, error: DetectorError) {
                self.0.lock().push(error);
            }
            async fn on_close(&self) {}
        }
        let _sub = detector.subscribe(collector).await;
        let _err_sub = detector.subscribe(Arc::new(ErrCollector(errors.clone()))).await;

        detector.on_next(Arc::new(tiny_frame())).await;
        detector.on_next(Arc::new(tiny_frame())).await;

        assert!(errors.lock().is_empty(), "a single failure must not throw");
        assert_eq!(results.lock().len(), 1, "the frame after recovery must still be delivered");
    }

    #[tokio::test]
    async fn consecutive_failures_past_the_threshold_throw_and_stop_delivery() {
        let outcomes = (0..PERSISTENT_FAILURE_THRESHOLD)
            .map(|_| Err("plugin raised".to_string()))
            .collect::<Vec<_>>();
        let detector = ReactiveDetector::new(
            Arc::new(ScriptedDetector {
                outcomes: SyncMutex::new(outcomes.into_iter()),
            }),
            Duration::from_secs(0),
        );
        let errors = Arc::new(SyncMutex::new(Vec::new()));
        struct ErrCollector(Arc<SyncMutex<Vec<DetectorError>>>);
        #[async_trait]
        impl Observer<DetectionResult, DetectorError> for ErrCollector {
            async fn on_next(&self, _value: Arc<DetectionResult>) {}
            async fn on_error(&self, error: DetectorError) {
                self.0.lock().push(error);
            }
            async fn on_close(&self) {}
        }
        let _sub = detector.subscribe(Arc::new(ErrCollector(errors.clone()))).await;

        for _ in 0..PERSISTENT_FAILURE_THRESHOLD {
            detector.on_next(Arc::new(tiny_frame())).await;
        }

        assert_eq!(errors.lock().len(), 1, "only the persistent failure should throw, not each one");
        assert!(matches!(errors.lock()[0], DetectorError::DetectFailed(_)));
    }
}
