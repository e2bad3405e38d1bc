//! Plugin discovery and whitelisting (spec §4.2).
//!
//! The original discovers plugins via Python `importlib.metadata.entry_points`.
//! There is no safe Rust equivalent without `dlopen`, so discovery here is a
//! trait the host process implements (`PluginSource`), consumed the same
//! way `kube_core::discovery::Discovery` consumes a `Client` rather than
//! reaching into a dynamic registry itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::descriptor::ComponentDescriptor;

/// One installed plugin: static metadata plus its descriptors, as the host
/// process linked it in.
#[derive(Clone)]
pub struct Plugin {
    pub name: String,
    pub version: String,
    pub first_author: String,
    pub components: Vec<ComponentDescriptor>,
}

/// Discovers the set of installed plugins at process start. Implemented by
/// the host binary (e.g. a `static` table of linked plugins), the
/// Rust-idiomatic analogue of `entry_points(group="sentinel.plugins")`
/// without an unsafe dynamic-loading subsystem.
pub trait PluginSource {
    fn discover(&self) -> Vec<Plugin>;
}

/// Load state of one discovered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginLoadState {
    /// Discovered but not on the whitelist; descriptors are not usable.
    NotWhitelisted,
    /// Whitelisted and loaded successfully.
    Loaded,
    /// Whitelisted, but loading failed (spec §4.2: "its slot records
    /// `plugin=None`").
    Failed(String),
}

struct Entry {
    plugin: Plugin,
    state: PluginLoadState,
}

/// Enumerates installed plugins, loads whitelisted ones, and exposes their
/// component descriptors. Whitelist mutation is tracked with a dirty flag
/// (spec §4.2: "Whitelist changes take effect only at the next startup").
pub struct PluginRegistry {
    entries: RwLock<HashMap<String, Entry>>,
    whitelist: RwLock<HashSet<String>>,
    dirty: RwLock<bool>,
}

impl PluginRegistry {
    /// Discovers plugins via `source`, loading every whitelisted one.
    /// A plugin whose discovery itself panics/fails to load is recorded as
    /// `Failed` rather than propagating (spec §4.2: "loading a plugin that
    /// raises is caught").
    pub fn discover(source: &dyn PluginSource, whitelist: HashSet<String>) -> Self {
        let mut entries = HashMap::new();
        for plugin in source.discover() {
            let state = if whitelist.contains(&plugin.name) {
                PluginLoadState::Loaded
            } else {
                PluginLoadState::NotWhitelisted
            };
            entries.insert(plugin.name.clone(), Entry { plugin, state });
        }
        Self {
            entries: RwLock::new(entries),
            whitelist: RwLock::new(whitelist),
            dirty: RwLock::new(false),
        }
    }

    /// Records a plugin load failure discovered after construction (e.g. a
    /// lazily-initialized plugin whose setup routine errors).
    pub fn mark_failed(&self, plugin_name: &str, message: impl Into<String>) {
        if let Some(entry) = self.entries.write().get_mut(plugin_name) {
            entry.state = PluginLoadState::Failed(message.into());
        }
    }

    /// Metadata for every discovered plugin, for the UI's plugin table.
    #[must_use]
    pub fn list_plugins(&self) -> Vec<(String, String, String, PluginLoadState)> {
        self.entries
            .read()
            .values()
            .map(|e| {
                (
                    e.plugin.name.clone(),
                    e.plugin.version.clone(),
                    e.plugin.first_author.clone(),
                    e.state.clone(),
                )
            })
            .collect()
    }

    /// Finds a loaded component descriptor by plugin and component name.
    /// Returns `None` both when the plugin is missing/not loaded and when
    /// the component name doesn't match (spec §4.2: "component lookup
    /// failures return sentinel null values; callers map to Error").
    #[must_use]
    pub fn find_component(&self, plugin_name: &str, component_name: &str) -> Option<ComponentDescriptor> {
        let entries = self.entries.read();
        let entry = entries.get(plugin_name)?;
        if entry.state != PluginLoadState::Loaded {
            return None;
        }
        entry
            .plugin
            .components
            .iter()
            .find(|c| c.display_name == component_name)
            .cloned()
    }

    /// Every loaded descriptor across every whitelisted plugin whose kind
    /// satisfies `predicate`, for a manager's "available components" surface
    /// (spec §4.5 / §4.6).
    #[must_use]
    pub fn search(&self, predicate: impl Fn(&ComponentDescriptor) -> bool) -> Vec<ComponentDescriptor> {
        self.entries
            .read()
            .values()
            .filter(|e| e.state == PluginLoadState::Loaded)
            .flat_map(|e| e.plugin.components.iter().filter(|c| predicate(c)).cloned())
            .collect()
    }

    /// Current whitelist.
    #[must_use]
    pub fn whitelist(&self) -> HashSet<String> {
        self.whitelist.read().clone()
    }

    /// Adds a plugin name to the whitelist, setting the dirty flag. Does not
    /// load the plugin now; effective at next startup (spec §4.2).
    pub fn add_to_whitelist(&self, plugin_name: impl Into<String>) {
        let mut whitelist = self.whitelist.write();
        if whitelist.insert(plugin_name.into()) {
            *self.dirty.write() = true;
        }
    }

    /// Removes a plugin name from the whitelist, setting the dirty flag.
    pub fn remove_from_whitelist(&self, plugin_name: &str) {
        let mut whitelist = self.whitelist.write();
        if whitelist.remove(plugin_name) {
            *self.dirty.write() = true;
        }
    }

    /// True if the whitelist has been mutated since construction (or since
    /// the last [`PluginRegistry::clear_dirty`]), so the UI can warn that a
    /// restart is needed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        *self.dirty.read()
    }

    /// Clears the dirty flag, e.g. once the new whitelist has been persisted
    /// to the configuration file and acknowledged.
    pub fn clear_dirty(&self) {
        *self.dirty.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::descriptor::{ComponentKind, Constructed};
    use std::collections::HashSet;

    fn descriptor(name: &str) -> ComponentDescriptor {
        ComponentDescriptor {
            display_name: name.to_string(),
            kind: ComponentKind::AsyncVideoStream,
            args: vec![],
            args_transform: None,
            construct: Arc::new(|_| Err::<Constructed, String>("not constructible in tests".to_string())),
        }
    }

    struct FixedSource(Vec<Plugin>);
    impl PluginSource for FixedSource {
        fn discover(&self) -> Vec<Plugin> {
            self.0.clone()
        }
    }

    #[test]
    fn non_whitelisted_plugins_are_enumerated_but_not_loaded() {
        let source = FixedSource(vec![Plugin {
            name: "acme".to_string(),
            version: "1.0".to_string(),
            first_author: "a".to_string(),
            components: vec![descriptor("cam")],
        }]);
        let registry = PluginRegistry::discover(&source, HashSet::new());

        assert_eq!(registry.list_plugins().len(), 1);
        assert!(registry.find_component("acme", "cam").is_none());
    }

    #[test]
    fn whitelisted_plugin_components_are_findable() {
        let source = FixedSource(vec![Plugin {
            name: "acme".to_string(),
            version: "1.0".to_string(),
            first_author: "a".to_string(),
            components: vec![descriptor("cam")],
        }]);
        let registry = PluginRegistry::discover(&source, HashSet::from(["acme".to_string()]));

        assert!(registry.find_component("acme", "cam").is_some());
        assert!(registry.find_component("acme", "missing").is_none());
    }

    #[test]
    fn whitelist_mutation_sets_dirty_flag() {
        let source = FixedSource(vec![]);
        let registry = PluginRegistry::discover(&source, HashSet::new());
        assert!(!registry.is_dirty());

        registry.add_to_whitelist("acme");
        assert!(registry.is_dirty());

        registry.clear_dirty();
        assert!(!registry.is_dirty());

        registry.remove_from_whitelist("acme");
        assert!(registry.is_dirty());
    }
}
