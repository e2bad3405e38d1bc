//! `VideoSourceAlertEmitter`: turns detection results into alerts for one
//! video source (spec §4.8).
//!
//! Grounded in the emitter half of
//! `examples/original_source/packages/sentinel-server/sentinel_server/alert/__init__.py`.
//! The internal queue is unbounded, per spec §9's reference design ("a
//! production implementation should impose a bound... this is a documented
//! tuning knob" — left as a knob here too, not implemented, since no
//! detector storm load-shedding policy is specified).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::detector::DetectorError;
use crate::model::{Alert, DetectionResult};
use crate::subject::Observer;
use crate::subscriber::registrar::Emitter;

/// One per enabled video source. Observes [`DetectionResult`]s from a
/// [`crate::detector::ReactiveDetector`] and turns non-empty ones into
/// alerts, queued for the [`crate::subscriber::SubscriptionRegistrar`] to drain.
pub struct VideoSourceAlertEmitter {
    source_name: String,
    tx: mpsc::UnboundedSender<Alert>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Alert>>,
}

impl VideoSourceAlertEmitter {
    /// Creates an emitter attributing alerts to `source_name` (spec §4.8:
    /// `source = source.name`).
    #[must_use]
    pub fn new(source_name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source_name: source_name.into(),
            tx,
            rx: AsyncMutex::new(rx),
        }
    }
}

#[async_trait]
impl Observer<DetectionResult, DetectorError> for VideoSourceAlertEmitter {
    async fn on_next(&self, value: Arc<DetectionResult>) {
        if value.detections.is_empty() {
            return;
        }
        let alert = Alert::camera_alert(&self.source_name, &value.detections, Utc::now());
        // The receiving half only goes away when this emitter is dropped
        // (deregistered), at which point the registrar's driver task for it
        // has already been aborted, so a failed send here can't be observed.
        let _ = self.tx.send(alert);
    }

    async fn on_error(&self, _error: DetectorError) {}

    async fn on_close(&self) {}
}

#[async_trait]
impl Emitter for VideoSourceAlertEmitter {
    async fn next_alert(&self) -> Alert {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("VideoSourceAlertEmitter sender dropped while still registered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, Detection, PredictedCategory};

    fn detection(name: &str, score: f32) -> Detection {
        Detection {
            pred_categories: vec![PredictedCategory {
                name: name.to_string(),
                score: Some(score),
            }],
            bounding_box: BoundingBox { x: 1, y: 1, width: 3, height: 3 },
        }
    }

    fn frame() -> std::sync::Arc<crate::model::Frame> {
        std::sync::Arc::new(crate::model::Frame::new(1, 1, 1, vec![0], None))
    }

    #[tokio::test]
    async fn empty_detection_results_produce_no_alert() {
        let emitter = VideoSourceAlertEmitter::new("front-door");
        emitter
            .on_next(Arc::new(DetectionResult { frame: frame(), detections: vec![] }))
            .await;

        let result = tokio::time::timeout(std::time::Duration::from_millis(20), emitter.next_alert()).await;
        assert!(result.is_err(), "no alert should have been queued");
    }

    #[tokio::test]
    async fn non_empty_detection_result_produces_a_camera_alert() {
        let emitter = VideoSourceAlertEmitter::new("front-door");
        emitter
            .on_next(Arc::new(DetectionResult {
                frame: frame(),
                detections: vec![detection("person", 0.9)],
            }))
            .await;

        let alert = emitter.next_alert().await;
        assert_eq!(alert.header, "Camera Alert");
        assert_eq!(alert.description, "Detected: person");
        assert_eq!(alert.source, "front-door");
        assert_eq!(alert.source_type, "Video Source");
    }
}
