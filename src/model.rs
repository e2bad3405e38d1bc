//! Core value types shared by every pipeline stage.
//!
//! These mirror `sentinel_core.video.Frame`, `sentinel_core.video.detect.*`
//! and `sentinel_core.alert.Alert` in the original implementation
//! (`examples/original_source/packages/sentinel-core`), translated into
//! plain, cheaply-clonable Rust value types. `Frame` and `DetectionResult`
//! are wrapped in `Arc` wherever the pipeline hands them to more than one
//! observer, matching the "frame reference is borrowed, not owned; lifetime
//! ends when the last observer releases it" invariant in spec §3.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single captured frame: an opaque, byte-typed pixel buffer plus shape
/// and an optional capture timestamp.
///
/// Immutable once constructed. Visualisers must copy `data` before drawing
/// overlays on top of it rather than mutating it in place, since the same
/// `Arc<Frame>` may be held by several observers concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame height, in pixels.
    pub height: u32,
    /// Frame width, in pixels.
    pub width: u32,
    /// Number of channels per pixel (e.g. 3 for RGB, 1 for grayscale).
    pub channels: u8,
    /// Capture timestamp, milliseconds since the Unix epoch, if the source provided one.
    pub captured_at_millis: Option<i64>,
    /// Raw pixel buffer, `height * width * channels` bytes, row-major.
    pub data: std::sync::Arc<[u8]>,
}

impl Frame {
    /// Builds a frame, panicking only on the obvious programmer error of a
    /// buffer whose length doesn't match the declared shape.
    pub fn new(height: u32, width: u32, channels: u8, data: Vec<u8>, captured_at_millis: Option<i64>) -> Self {
        let expected = height as usize * width as usize * channels as usize;
        assert_eq!(
            data.len(),
            expected,
            "frame buffer length {} does not match {}x{}x{}",
            data.len(),
            height,
            width,
            channels
        );
        Self {
            height,
            width,
            channels,
            captured_at_millis,
            data: data.into(),
        }
    }
}

/// An axis-aligned bounding box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge, in pixels.
    pub x: i32,
    /// Top edge, in pixels.
    pub y: i32,
    /// Width, in pixels.
    pub width: i32,
    /// Height, in pixels.
    pub height: i32,
}

/// One predicted category for a detection, with an optional confidence score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedCategory {
    /// Category name (e.g. `"person"`).
    pub name: String,
    /// Confidence score in `[0, 1]`, if the detector produced one.
    pub score: Option<f32>,
}

/// A single detected object: a bounding box plus a non-empty, ordered list
/// of predicted categories. The detector's own ordering is preserved;
/// consumers that want a single label use [`Detection::primary_category`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Ordered predicted categories. Never empty for a well-formed detection.
    pub pred_categories: Vec<PredictedCategory>,
    /// Where the detection was found in the frame.
    pub bounding_box: BoundingBox,
}

impl Detection {
    /// The category with the highest score, treating a missing score as
    /// negative infinity (spec §4.8 / §9: tie-breaking is implementation
    /// defined). Ties keep the first-seen category, i.e. `max_by` favors
    /// the later equal element so we scan in reverse to prefer the earlier
    /// one on a tie.
    #[must_use]
    pub fn primary_category(&self) -> Option<&PredictedCategory> {
        self.pred_categories
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                let sa = a.score.unwrap_or(f32::NEG_INFINITY);
                let sb = b.score.unwrap_or(f32::NEG_INFINITY);
                sa.partial_cmp(&sb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ib.cmp(ia))
            })
            .map(|(_, cat)| cat)
    }
}

/// The result of running a detector against one frame: the frame itself
/// (so downstream observers can still draw overlays) plus zero or more
/// detections. An empty `detections` vec is how [`crate::detector::ReactiveDetector`]
/// represents "this frame was not actually run through inference" (gated by
/// the detection interval).
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The frame that was (or would have been) detected against.
    pub frame: std::sync::Arc<Frame>,
    /// Detections found in `frame`, in detector order. Empty if gated or if
    /// inference genuinely found nothing.
    pub detections: Vec<Detection>,
}

/// An immutable alert record, as produced by an [`crate::alert::emitter::VideoSourceAlertEmitter`]
/// or any other `Emitter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Short human-readable title, at most 256 bytes once persisted (see `store::AlertRecord`).
    pub header: String,
    /// Longer human-readable body, at most 2048 bytes once persisted.
    pub description: String,
    /// Name of the originating entity (e.g. the video source's name).
    pub source: String,
    /// Category of the originating entity (e.g. `"Video Source"`).
    pub source_type: String,
    /// Wall-clock time the alert was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary structured payload.
    pub data: BTreeMap<String, Value>,
}

impl Alert {
    /// Builds a `"Camera Alert"` for a non-empty detection result, per spec §4.8:
    /// header is fixed, description lists primary category names, and `data`
    /// carries the same names under `"detections"`.
    #[must_use]
    pub fn camera_alert(source: &str, detections: &[Detection], now: DateTime<Utc>) -> Self {
        let names: Vec<String> = detections
            .iter()
            .filter_map(Detection::primary_category)
            .map(|cat| cat.name.clone())
            .collect();
        let description = format!("Detected: {}", names.join(", "));
        let mut data = BTreeMap::new();
        data.insert("detections".to_string(), Value::from(names));
        Self {
            header: "Camera Alert".to_string(),
            description,
            source: source.to_string(),
            source_type: "Video Source".to_string(),
            timestamp: now,
            data,
        }
    }
}

/// An [`Alert`] joined to its persisted row id and deletion-cascade flag.
///
/// Lifetime follows the backing row: once `source_deleted` is `true` the
/// alert's originating [`crate::video_source::VideoSource`] no longer exists,
/// but the alert itself is retained for history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedAlert {
    /// Persisted row id.
    pub id: i64,
    /// The alert payload.
    pub alert: Alert,
    /// Set once the originating source is deleted (spec §3 invariants).
    pub source_deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(name: &str, score: Option<f32>) -> PredictedCategory {
        PredictedCategory {
            name: name.to_string(),
            score,
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            x: 1,
            y: 1,
            width: 3,
            height: 3,
        }
    }

    #[test]
    fn primary_category_picks_max_score() {
        let d = Detection {
            pred_categories: vec![cat("cat", Some(0.2)), cat("dog", Some(0.9)), cat("bird", Some(0.5))],
            bounding_box: bbox(),
        };
        assert_eq!(d.primary_category().unwrap().name, "dog");
    }

    #[test]
    fn primary_category_treats_missing_score_as_neg_infinity() {
        let d = Detection {
            pred_categories: vec![cat("unknown", None), cat("person", Some(0.1))],
            bounding_box: bbox(),
        };
        assert_eq!(d.primary_category().unwrap().name, "person");
    }

    #[test]
    fn primary_category_breaks_ties_toward_first_seen() {
        let d = Detection {
            pred_categories: vec![cat("first", Some(0.5)), cat("second", Some(0.5))],
            bounding_box: bbox(),
        };
        assert_eq!(d.primary_category().unwrap().name, "first");
    }

    #[test]
    fn camera_alert_formats_description_from_primary_categories() {
        let now = Utc::now();
        let detections = vec![
            Detection {
                pred_categories: vec![cat("person", Some(0.9))],
                bounding_box: bbox(),
            },
            Detection {
                pred_categories: vec![cat("car", Some(0.4))],
                bounding_box: bbox(),
            },
        ];
        let alert = Alert::camera_alert("front-door", &detections, now);
        assert_eq!(alert.header, "Camera Alert");
        assert_eq!(alert.description, "Detected: person, car");
        assert_eq!(alert.source, "front-door");
        assert_eq!(alert.source_type, "Video Source");
        assert_eq!(
            alert.data.get("detections").unwrap(),
            &Value::from(vec!["person", "car"])
        );
    }
}
