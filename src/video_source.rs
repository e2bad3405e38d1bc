//! `VideoSource` and `VideoSourceManager` (spec §4.5): one pipeline per
//! camera, its lifecycle state machine, and observer attach/detach.
//!
//! Grounded in `VideoSourceManager` from
//! `examples/original_source/packages/sentinel-server/sentinel_server/video/__init__.py`,
//! restructured so every lifecycle method claims the entity's live handles
//! via `Option::take()` under a single lock before tearing them down —
//! that's what makes the "enable/disable idempotence" and the
//! error-triggered teardown racing an explicit `disable()` both safe without
//! a separate `disabling` flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::alert::{AlertManager, VideoSourceAlertEmitter};
use crate::detector::{AsyncDetector, DetectorError, ReactiveDetector, SyncDetector, SyncDetectorAdapter};
use crate::error::VideoSourceError;
use crate::model::DetectionResult;
use crate::plugin::{ComponentDescriptor, ComponentKind, Constructed, ConstructedComponent, PluginRegistry, RawSyncComponent};
use crate::store::{VideoSourceRecord, VideoSourceRepository};
use crate::subject::{Observer, Subscription};
use crate::subscriber::registrar::{EmitterId, SubscriptionRegistrar};
use crate::task::CancelableJoinHandle;
use crate::video_stream::{AsyncVideoStream, ReactiveVideoStream, StreamError, SyncVideoStream, SyncVideoStreamAdapter};

/// Runtime status of a [`VideoSource`] (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSourceStatus {
    Ok,
    Error,
}

/// A video source entity as exposed to callers: persisted fields plus runtime status.
#[derive(Debug, Clone)]
pub struct VideoSource {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub detect_interval_seconds: f64,
    pub vidstream_plugin_name: String,
    pub vidstream_component_name: String,
    pub vidstream_config: Value,
    pub detector_plugin_name: String,
    pub detector_component_name: String,
    pub detector_config: Value,
    pub status: VideoSourceStatus,
}

/// Caller-assigned identity for an attached observer (spec §3: "a subscriber
/// may be attached... but never duplicated" needs some notion of identity;
/// Rust has no cheap equivalent of Python's `id()` for trait objects, so
/// callers name their own observer — see `DESIGN.md`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

type ResultObserver = Arc<dyn Observer<DetectionResult, DetectorError>>;

struct LiveHandles {
    video_stream: Arc<ReactiveVideoStream>,
    video_task: CancelableJoinHandle<()>,
    detector: Arc<ReactiveDetector>,
    detector_subscription: Subscription<crate::model::Frame, StreamError>,
    emitter: Arc<VideoSourceAlertEmitter>,
    emitter_subscription: Subscription<DetectionResult, DetectorError>,
    observer_subscriptions: HashMap<ObserverId, Subscription<DetectionResult, DetectorError>>,
}

struct Entry {
    record: VideoSourceRecord,
    status: VideoSourceStatus,
    live: Option<LiveHandles>,
    /// Observer registrations, retained across disable/enable cycles
    /// (spec §3: "observer registrations are retained for restart").
    observers: HashMap<ObserverId, ResultObserver>,
}

impl Entry {
    fn view(&self) -> VideoSource {
        VideoSource {
            id: self.record.id,
            name: self.record.name.clone(),
            enabled: self.record.enabled,
            detect_interval_seconds: self.record.detect_interval,
            vidstream_plugin_name: self.record.vidstream_plugin_name.clone(),
            vidstream_component_name: self.record.vidstream_component_name.clone(),
            vidstream_config: self.record.vidstream_config.clone(),
            detector_plugin_name: self.record.detector_plugin_name.clone(),
            detector_component_name: self.record.detector_component_name.clone(),
            detector_config: self.record.detector_config.clone(),
            status: self.status,
        }
    }
}

/// Owns the id -> [`VideoSource`] mapping and mediates every lifecycle
/// operation (spec §4.5).
pub struct VideoSourceManager {
    repo: Arc<dyn VideoSourceRepository>,
    plugins: Arc<PluginRegistry>,
    registrar: Arc<SubscriptionRegistrar>,
    alert_manager: Arc<AlertManager>,
    entries: parking_lot::RwLock<HashMap<i64, Entry>>,
    failure_epoch: AtomicU64,
}

impl VideoSourceManager {
    #[must_use]
    pub fn new(
        repo: Arc<dyn VideoSourceRepository>,
        plugins: Arc<PluginRegistry>,
        registrar: Arc<SubscriptionRegistrar>,
        alert_manager: Arc<AlertManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            repo,
            plugins,
            registrar,
            alert_manager,
            entries: parking_lot::RwLock::new(HashMap::new()),
            failure_epoch: AtomicU64::new(0),
        })
    }

    /// Persists a new, disabled video source.
    pub async fn create(
        &self,
        name: impl Into<String>,
        detect_interval_seconds: f64,
        vidstream_plugin_name: impl Into<String>,
        vidstream_component_name: impl Into<String>,
        vidstream_config: Value,
        detector_plugin_name: impl Into<String>,
        detector_component_name: impl Into<String>,
        detector_config: Value,
    ) -> Result<VideoSource, VideoSourceError> {
        let record = self
            .repo
            .insert(VideoSourceRecord {
                id: 0,
                name: name.into(),
                enabled: false,
                detect_interval: detect_interval_seconds,
                vidstream_plugin_name: vidstream_plugin_name.into(),
                vidstream_component_name: vidstream_component_name.into(),
                vidstream_config,
                detector_plugin_name: detector_plugin_name.into(),
                detector_component_name: detector_component_name.into(),
                detector_config,
            })
            .await?;
        let view = VideoSource {
            id: record.id,
            name: record.name.clone(),
            enabled: record.enabled,
            detect_interval_seconds: record.detect_interval,
            vidstream_plugin_name: record.vidstream_plugin_name.clone(),
            vidstream_component_name: record.vidstream_component_name.clone(),
            vidstream_config: record.vidstream_config.clone(),
            detector_plugin_name: record.detector_plugin_name.clone(),
            detector_component_name: record.detector_component_name.clone(),
            detector_config: record.detector_config.clone(),
            status: VideoSourceStatus::Ok,
        };
        self.entries.write().insert(
            record.id,
            Entry {
                record,
                status: VideoSourceStatus::Ok,
                live: None,
                observers: HashMap::new(),
            },
        );
        Ok(view)
    }

    /// Restores every persisted video source at startup (spec §3's
    /// persistence round-trip invariant).
    pub async fn load_from_db(self: &Arc<Self>) -> Result<(), VideoSourceError> {
        let records = self.repo.all().await?;
        for record in records {
            let id = record.id;
            let enabled = record.enabled;
            self.entries.write().insert(
                id,
                Entry {
                    record,
                    status: VideoSourceStatus::Ok,
                    live: None,
                    observers: HashMap::new(),
                },
            );
            if enabled {
                self.enable(id).await?;
            }
        }
        Ok(())
    }

    /// Enable protocol (spec §4.5): idempotent if already live.
    pub async fn enable(self: &Arc<Self>, id: i64) -> Result<(), VideoSourceError> {
        let already_live = self
            .entries
            .read()
            .get(&id)
            .map(|e| e.record.enabled && e.live.is_some())
            .unwrap_or(false);
        if already_live {
            return Ok(());
        }

        {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(VideoSourceError::NotFound(id))?;
            entry.record.enabled = true;
        }
        let record = self
            .entries
            .read()
            .get(&id)
            .ok_or(VideoSourceError::NotFound(id))?
            .record
            .clone();
        self.repo.update(record.clone()).await?;

        let span = tracing::info_span!("enable_video_source", id, name = %record.name);
        let _enter = span.enter();

        match self.bring_live(id, &record).await {
            Ok(handles) => {
                let mut entries = self.entries.write();
                if let Some(entry) = entries.get_mut(&id) {
                    entry.live = Some(handles);
                    entry.status = VideoSourceStatus::Ok;
                }
                tracing::info!("video source enabled");
            }
            Err(message) => {
                tracing::warn!(error = %message, "failed to enable video source");
                if let Some(entry) = self.entries.write().get_mut(&id) {
                    entry.status = VideoSourceStatus::Error;
                    entry.live = None;
                }
            }
        }
        Ok(())
    }

    async fn bring_live(self: &Arc<Self>, id: i64, record: &VideoSourceRecord) -> Result<LiveHandles, String> {
        let vidstream_descriptor = self
            .plugins
            .find_component(&record.vidstream_plugin_name, &record.vidstream_component_name)
            .ok_or_else(|| format!("video stream component {} not found", record.vidstream_component_name))?;
        let raw_stream = Self::instantiate_video_stream(&vidstream_descriptor, record.vidstream_config.clone())?;

        let video_stream = Arc::new(ReactiveVideoStream::new());
        let driver_stream = video_stream.clone();
        let video_task = CancelableJoinHandle::spawn(async move {
            driver_stream.run(raw_stream).await;
        });

        let detector_descriptor = match self
            .plugins
            .find_component(&record.detector_plugin_name, &record.detector_component_name)
        {
            Some(d) => d,
            None => {
                video_stream.request_stop();
                return Err(format!("detector component {} not found", record.detector_component_name));
            }
        };
        let raw_detector = match Self::instantiate_detector(&detector_descriptor, record.detector_config.clone()) {
            Ok(d) => d,
            Err(message) => {
                video_stream.request_stop();
                return Err(message);
            }
        };

        let interval = std::time::Duration::from_secs_f64(record.detect_interval.max(0.0));
        let detector = Arc::new(ReactiveDetector::new(raw_detector, interval));
        let detector_subscription = video_stream.subscribe(detector.clone()).await;
        self.watch_for_failure(id, video_stream.clone(), detector.clone());

        let stored_observers: Vec<(ObserverId, ResultObserver)> = self
            .entries
            .read()
            .get(&id)
            .map(|e| e.observers.iter().map(|(k, v)| (*k, v.clone())).collect())
            .unwrap_or_default();
        let mut observer_subscriptions = HashMap::new();
        for (oid, observer) in stored_observers {
            let sub = detector.subscribe(observer).await;
            observer_subscriptions.insert(oid, sub);
        }

        let emitter = Arc::new(VideoSourceAlertEmitter::new(record.name.clone()));
        let emitter_subscription = detector.subscribe(emitter.clone()).await;
        self.registrar.add_emitter(EmitterId(id), emitter.clone()).await;

        Ok(LiveHandles {
            video_stream,
            video_task,
            detector,
            detector_subscription,
            emitter,
            emitter_subscription,
            observer_subscriptions,
        })
    }

    /// Spawns a detached watcher that transitions the source to `Error` the
    /// first time the video stream or the detector throws (spec §4.3's note
    /// that persistent no-data should drive the source to `Error`, spec
    /// §7's matching rule for persistent detector failure, and spec §4.5's
    /// task-completion failure path). A single transient `detect()` failure
    /// never reaches here: [`ReactiveDetector`] only throws once its own
    /// failure has been persistent (see `detector.rs`). Runs on its own task
    /// so it never awaits the very driver task it's watching.
    fn watch_for_failure(self: &Arc<Self>, id: i64, video_stream: Arc<ReactiveVideoStream>, detector: Arc<ReactiveDetector>) {
        let epoch = self.failure_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        struct FailureSignal {
            tx: parking_lot::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        }
        impl FailureSignal {
            fn fire(&self) {
                if let Some(tx) = self.tx.lock().take() {
                    let _ = tx.send(());
                }
            }
        }
        #[async_trait]
        impl<T, E> Observer<T, E> for FailureSignal
        where
            T: Send + Sync + 'static,
            E: Send + Sync + 'static,
        {
            async fn on_next(&self, _value: Arc<T>) {}
            async fn on_error(&self, _error: E) {
                self.fire();
            }
            async fn on_close(&self) {}
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let signal = Arc::new(FailureSignal { tx: parking_lot::Mutex::new(Some(tx)) });
        let manager = self.clone();
        tokio::spawn(async move {
            let _video_sub = video_stream.subscribe(signal.clone()).await;
            let _detector_sub = detector.subscribe(signal).await;
            if rx.await.is_ok() {
                manager.fail(id, epoch).await;
            }
        });
    }

    async fn fail(self: &Arc<Self>, id: i64, epoch: u64) {
        if self.failure_epoch.load(Ordering::SeqCst) != epoch {
            // A newer enable() has superseded this watcher; ignore.
            return;
        }
        let Some(handles) = self.entries.write().get_mut(&id).and_then(|e| e.live.take()) else {
            return;
        };
        tracing::warn!(id, "video source failed, tearing down pipeline");
        Self::teardown(handles, &self.registrar, id).await;
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.status = VideoSourceStatus::Error;
        }
    }

    async fn teardown(mut handles: LiveHandles, registrar: &SubscriptionRegistrar, id: i64) {
        // Mirrors the disable protocol's order (spec §4.5): soft-dispose
        // observers, stop the detector, stop the video stream, deregister the emitter.
        for (_, mut sub) in handles.observer_subscriptions.drain() {
            sub.dispose().await;
        }
        handles.detector_subscription.dispose().await;
        handles.detector.on_close().await;
        handles.video_stream.request_stop();
        let _ = handles.video_task.await;
        handles.emitter_subscription.dispose().await;
        registrar.remove_emitter(EmitterId(id)).await;
    }

    /// Disable protocol (spec §4.5): idempotent if already disabled.
    pub async fn disable(&self, id: i64) -> Result<(), VideoSourceError> {
        let handles = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(VideoSourceError::NotFound(id))?;
            entry.record.enabled = false;
            entry.live.take()
        };
        let record = self
            .entries
            .read()
            .get(&id)
            .ok_or(VideoSourceError::NotFound(id))?
            .record
            .clone();
        self.repo.update(record).await?;

        if let Some(handles) = handles {
            Self::teardown(handles, &self.registrar, id).await;
        }
        Ok(())
    }

    /// Delete protocol (spec §4.5): disable if enabled, hard-dispose observer
    /// registrations, remove the row, cascade to historical alerts.
    pub async fn delete(&self, id: i64) -> Result<(), VideoSourceError> {
        self.disable(id).await.ok();
        let name = self
            .entries
            .read()
            .get(&id)
            .ok_or(VideoSourceError::NotFound(id))?
            .record
            .name
            .clone();
        self.repo.delete(id).await?;
        self.entries.write().remove(&id);
        self.alert_manager.mark_source_deleted(&name).await?;
        Ok(())
    }

    /// Attaches `observer` under `observer_id` (spec §4.5's `subscribe_to`).
    /// If the source is live, subscribes immediately; otherwise the
    /// registration is retained for the next enable.
    pub async fn subscribe_to(&self, id: i64, observer_id: ObserverId, observer: ResultObserver) -> Result<(), VideoSourceError> {
        let detector = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(VideoSourceError::NotFound(id))?;
            entry.observers.insert(observer_id, observer.clone());
            entry.live.as_ref().map(|h| h.detector.clone())
        };
        if let Some(detector) = detector {
            let sub = detector.subscribe(observer).await;
            if let Some(entry) = self.entries.write().get_mut(&id) {
                if let Some(handles) = entry.live.as_mut() {
                    handles.observer_subscriptions.insert(observer_id, sub);
                }
            }
        }
        Ok(())
    }

    /// Detaches `observer_id`. Soft (`hard=false`) retains the registration
    /// for a later re-attach; hard removes it entirely.
    pub async fn unsubscribe_from(&self, id: i64, observer_id: ObserverId, hard: bool) -> Result<(), VideoSourceError> {
        let sub = {
            let mut entries = self.entries.write();
            let entry = entries.get_mut(&id).ok_or(VideoSourceError::NotFound(id))?;
            if hard {
                entry.observers.remove(&observer_id);
            }
            entry.live.as_mut().and_then(|h| h.observer_subscriptions.remove(&observer_id))
        };
        if let Some(mut sub) = sub {
            sub.dispose().await;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<VideoSource> {
        self.entries.read().get(&id).map(Entry::view)
    }

    #[must_use]
    pub fn list(&self) -> Vec<VideoSource> {
        self.entries.read().values().map(Entry::view).collect()
    }

    /// Video-stream- and detector-kind components available for UI selection.
    #[must_use]
    pub fn available_components(&self) -> Vec<ComponentDescriptor> {
        self.plugins.search(|d| {
            matches!(
                d.kind,
                ComponentKind::AsyncVideoStream
                    | ComponentKind::SyncVideoStream
                    | ComponentKind::AsyncDetector
                    | ComponentKind::SyncDetector
            )
        })
    }

    fn instantiate_video_stream(descriptor: &ComponentDescriptor, config: Value) -> Result<Box<dyn AsyncVideoStream>, String> {
        if !matches!(descriptor.kind, ComponentKind::AsyncVideoStream | ComponentKind::SyncVideoStream) {
            return Err(format!("descriptor {} is not a video stream kind", descriptor.display_name));
        }
        match descriptor.build(config)? {
            Constructed::Async(ConstructedComponent::VideoStream(s)) => Ok(s),
            Constructed::Sync(RawSyncComponent::VideoStream(s)) => Ok(Box::new(SyncVideoStreamAdapter::new(s))),
            _ => Err("descriptor did not construct a video stream".to_string()),
        }
    }

    fn instantiate_detector(descriptor: &ComponentDescriptor, config: Value) -> Result<Arc<dyn AsyncDetector>, String> {
        if !matches!(descriptor.kind, ComponentKind::AsyncDetector | ComponentKind::SyncDetector) {
            return Err(format!("descriptor {} is not a detector kind", descriptor.display_name));
        }
        match descriptor.build(config)? {
            Constructed::Async(ConstructedComponent::Detector(d)) => Ok(d),
            Constructed::Sync(RawSyncComponent::Detector(d)) => Ok(Arc::new(SyncDetectorAdapter::new(d))),
            _ => Err("descriptor did not construct a detector".to_string()),
        }
    }
}
