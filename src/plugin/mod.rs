//! Plugin/component abstraction (spec §4.2).

pub mod descriptor;
pub mod registry;

pub use descriptor::{
    Choice, ComponentArgDescriptor, ComponentDescriptor, ComponentKind, Constructed,
    ConstructedComponent, RawSyncComponent,
};
pub use registry::{Plugin, PluginLoadState, PluginRegistry, PluginSource};
