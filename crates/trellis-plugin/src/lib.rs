//! Trellis plugin loading and isolation
//!
//! Plugins are boundary-scoped capability providers: each one is registered
//! under its coordinate, declares the configuration options it accepts, and
//! contributes stage handlers. Every loaded plugin gets its own context
//! carrying its own resolved dependency set, so two plugins using
//! conflicting versions of a shared library never interfere; only the
//! [`Plugin`]/[`StageHandler`] contract crosses the boundary.

pub mod config;
pub mod contract;
pub mod loader;
pub mod registry;

pub use config::{OptionSpec, PluginConfig};
pub use contract::{HandlerError, HandlerResult, ModuleContext, Plugin, StageHandler, StageOutput};
pub use loader::{LoadedPlugin, PluginLoader, PluginRequest};
pub use registry::PluginRegistry;

/// Plugin loading and configuration errors
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("cannot load plugin '{coordinate}': {reason}")]
    Load { coordinate: String, reason: String },

    #[error("invalid configuration for plugin '{plugin}', option '{option}': {reason}")]
    Configuration {
        plugin: String,
        option: String,
        reason: String,
    },
}

impl PluginError {
    /// Create a load error
    pub fn load(coordinate: impl ToString, reason: impl Into<String>) -> Self {
        Self::Load {
            coordinate: coordinate.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(
        plugin: impl ToString,
        option: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            plugin: plugin.to_string(),
            option: option.into(),
            reason: reason.into(),
        }
    }
}

pub type PluginResult<T> = Result<T, PluginError>;
