//! Reactive video-surveillance orchestration core.
//!
//! Cameras (`video_stream`) feed frames to detectors (`detector`), whose
//! results fan out to per-source alert emitters (`alert`), which the
//! subscription registrar (`subscriber::registrar`) delivers to every
//! registered subscriber. `video_source` and `subscriber::manager` own the
//! persisted entity lifecycles (create/enable/disable/delete) that wire
//! those pieces together; `lifecycle` sequences their construction at
//! startup and `config` loads the settings that drive it.
//!
//! See `subject` for the push-based multicast primitive every stage above
//! is built from.

pub mod alert;
pub mod config;
pub mod detector;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod plugin;
pub mod readiness;
pub mod store;
pub mod subject;
pub mod subscriber;
pub mod task;
pub mod video_source;
pub mod video_stream;

pub use config::Configuration;
pub use error::{ConfigError, SubscriberError, VideoSourceError};
pub use lifecycle::{Lifecycle, Runtime};
pub use model::{Alert, BoundingBox, Detection, DetectionResult, Frame, ManagedAlert, PredictedCategory};
pub use video_source::{ObserverId, VideoSource, VideoSourceManager, VideoSourceStatus};
