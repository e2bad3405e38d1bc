//! Static plugin/component metadata (spec §3 / §6 / §9).
//!
//! Grounded in `kube_core::discovery::ApiResource`/`ApiCapabilities`: small,
//! cheaply-clonable value types describing "a thing that can be
//! constructed" without owning the constructed thing itself, the same
//! separation spec.md draws between a `ComponentDescriptor` (a value) and
//! the live component it constructs.

use std::sync::Arc;

use serde_json::Value;

use crate::detector::{AsyncDetector, SyncDetector};
use crate::subscriber::{AsyncSubscriber, SyncSubscriber};
use crate::video_stream::{AsyncVideoStream, SyncVideoStream};

/// Which of the six capability sets a component implements (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    AsyncVideoStream,
    SyncVideoStream,
    AsyncDetector,
    SyncDetector,
    AsyncSubscriber,
    SyncSubscriber,
}

/// A permitted set of values for a [`ComponentArgDescriptor`] (spec §9's
/// "argument types are declared" / optional choice-set).
#[derive(Debug, Clone, PartialEq)]
pub struct Choice(pub Vec<Value>);

/// Static metadata for one constructor argument of a component (spec §3).
#[derive(Clone)]
pub struct ComponentArgDescriptor {
    /// Human-readable label for the UI.
    pub display_name: String,
    /// The key this argument is passed under in the configuration mapping.
    pub arg_key: String,
    /// Declared value type, as a free-form tag (`"int"`, `"string"`, ...);
    /// the configuration mapping itself stays loosely typed at the store
    /// boundary per spec §9, validated per-argument via `validator`.
    pub value_type: String,
    pub required: bool,
    pub default: Option<Value>,
    pub choices: Option<Choice>,
    /// Returns `Ok(())` if `value` is acceptable for this argument.
    pub validator: Option<Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>>,
}

impl std::fmt::Debug for ComponentArgDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentArgDescriptor")
            .field("display_name", &self.display_name)
            .field("arg_key", &self.arg_key)
            .field("value_type", &self.value_type)
            .field("required", &self.required)
            .field("default", &self.default)
            .field("choices", &self.choices)
            .field("validator", &self.validator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// What a [`ComponentDescriptor`] builds, erased behind the relevant async contract.
pub enum ConstructedComponent {
    VideoStream(Box<dyn AsyncVideoStream>),
    Detector(Arc<dyn AsyncDetector>),
    Subscriber(Arc<dyn AsyncSubscriber>),
}

/// A boxed synchronous component, prior to thread-pool adaptation.
pub enum RawSyncComponent {
    VideoStream(Box<dyn SyncVideoStream>),
    Detector(Arc<dyn SyncDetector>),
    Subscriber(Arc<dyn SyncSubscriber>),
}

/// What a component constructor actually produces, before kind-directed
/// wrapping (async components pass straight through; sync ones go through
/// the thread-pool adapter named by their kind).
pub enum Constructed {
    Async(ConstructedComponent),
    Sync(RawSyncComponent),
}

/// Static metadata of one plugin-provided component (spec §3).
///
/// Descriptors are values: any number of persisted entities
/// (`VideoSourceRecord`, `SubscriberRecord`) may reference the same
/// descriptor by `(plugin_name, component_name)`.
#[derive(Clone)]
pub struct ComponentDescriptor {
    pub display_name: String,
    pub kind: ComponentKind,
    pub args: Vec<ComponentArgDescriptor>,
    /// Optional pure transform over the raw configuration mapping before
    /// it reaches `construct` (spec §9: "a validator-plus-normaliser").
    pub args_transform: Option<Arc<dyn Fn(Value) -> Value + Send + Sync>>,
    /// Builds a live component from a (possibly already-transformed) config map.
    pub construct: Arc<dyn Fn(Value) -> Result<Constructed, String> + Send + Sync>,
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("display_name", &self.display_name)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl ComponentDescriptor {
    /// Applies `args_transform` (if any), then `construct`.
    pub fn build(&self, config: Value) -> Result<Constructed, String> {
        let config = match &self.args_transform {
            Some(transform) => transform(config),
            None => config,
        };
        (self.construct)(config)
    }
}
