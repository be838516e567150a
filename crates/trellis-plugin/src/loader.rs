//! Loading resolved plugin bindings into isolated contexts

use crate::config::PluginConfig;
use crate::contract::StageHandler;
use crate::registry::PluginRegistry;
use crate::{PluginError, PluginResult};
use log::debug;
use semver::Version;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_model::{Coordinate, OptionValue};

/// One resolved plugin binding to load for a module: pinned version,
/// binding configuration, and the plugin's own resolved dependency
/// artifacts.
#[derive(Debug, Clone)]
pub struct PluginRequest {
    pub coordinate: Coordinate,
    pub version: Version,
    pub configuration: BTreeMap<String, OptionValue>,
    pub dependency_artifacts: Vec<PathBuf>,
}

/// A loaded plugin: its isolated context plus the stage handlers it
/// registered. Created at most once per coordinate and version for a
/// module, read-only afterwards.
pub struct LoadedPlugin {
    pub coordinate: Coordinate,
    pub version: Version,
    /// The plugin's own dependency set, visible only within this context
    pub dependency_artifacts: Vec<PathBuf>,
    pub config: PluginConfig,
    pub handlers: Vec<Arc<dyn StageHandler>>,
}

impl std::fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("coordinate", &self.coordinate)
            .field("version", &self.version)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Loads plugins for one module at a time from a registry
pub struct PluginLoader<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> PluginLoader<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Load a module's resolved plugin bindings. Repeated bindings of the
    /// same coordinate and version share one context; binding order is
    /// preserved otherwise.
    pub fn load(&self, requests: &[PluginRequest]) -> PluginResult<Vec<Arc<LoadedPlugin>>> {
        let mut loaded: Vec<Arc<LoadedPlugin>> = Vec::new();

        for request in requests {
            let duplicate = loaded
                .iter()
                .any(|p| p.coordinate == request.coordinate && p.version == request.version);
            if duplicate {
                debug!(
                    "plugin {}@{} already loaded for this module, sharing context",
                    request.coordinate, request.version
                );
                continue;
            }
            loaded.push(Arc::new(self.load_one(request)?));
        }

        Ok(loaded)
    }

    fn load_one(&self, request: &PluginRequest) -> PluginResult<LoadedPlugin> {
        let plugin = self.registry.get(&request.coordinate).ok_or_else(|| {
            PluginError::load(&request.coordinate, "entry point not registered")
        })?;

        let config =
            PluginConfig::validate(&request.coordinate, &plugin.options(), &request.configuration)?;

        let mut handlers = plugin.handlers(&config)?;
        // Stable stage order; registration order breaks ties within a stage.
        handlers.sort_by_key(|handler| handler.stage());

        debug!(
            "loaded plugin {}@{} with {} handlers",
            request.coordinate,
            request.version,
            handlers.len()
        );

        Ok(LoadedPlugin {
            coordinate: request.coordinate.clone(),
            version: request.version.clone(),
            dependency_artifacts: request.dependency_artifacts.clone(),
            config,
            handlers: handlers.into_iter().map(Arc::from).collect(),
        })
    }
}
