//! The capability registry
//!
//! Maps plugin coordinates to entry points at registration time. This is
//! the namespaced stand-in for dynamic code loading: a coordinate that was
//! never registered simply cannot be loaded, and nothing besides the
//! registered entry point is reachable from the host.

use crate::contract::Plugin;
use std::collections::BTreeMap;
use std::sync::Arc;
use trellis_model::Coordinate;

/// Registry of plugin entry points keyed by coordinate
#[derive(Default, Clone)]
pub struct PluginRegistry {
    entries: BTreeMap<Coordinate, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin entry point under its coordinate. Registering the
    /// same coordinate again replaces the previous entry point.
    pub fn register(&mut self, coordinate: Coordinate, plugin: impl Plugin + 'static) {
        self.entries.insert(coordinate, Arc::new(plugin));
    }

    /// Look up an entry point
    pub fn get(&self, coordinate: &Coordinate) -> Option<Arc<dyn Plugin>> {
        self.entries.get(coordinate).cloned()
    }

    /// Registered coordinates, in deterministic order
    pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("coordinates", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
