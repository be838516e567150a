//! Declared project definitions
//!
//! A `ProjectDefinition` is the raw, per-module declaration as read from a
//! definition file. It is immutable for the duration of a build run; the
//! cascade in [`crate::effective`] folds a definition with its parent chain
//! into an effective definition.

use crate::{Coordinate, DependencyDecl, OptionValue, VersionSpec};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A plugin binding: coordinate, version and stage configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginBinding {
    pub coordinate: Coordinate,
    pub version: VersionSpec,
    #[serde(default)]
    pub configuration: BTreeMap<String, OptionValue>,
}

impl PluginBinding {
    /// Create a binding with empty configuration
    pub fn new(coordinate: Coordinate, version: VersionSpec) -> Self {
        Self {
            coordinate,
            version,
            configuration: BTreeMap::new(),
        }
    }

    /// Set a configuration option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

/// A declared project definition for one module
///
/// `version` may be omitted and inherited through the parent chain; `group`
/// and `name` always identify the definition itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<Version>,
    /// Optional reference to a parent definition in the same build scope
    #[serde(default)]
    pub parent: Option<Coordinate>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    #[serde(default)]
    pub plugins: Vec<PluginBinding>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ProjectDefinition {
    /// Create a definition with a concrete version and nothing else declared
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: Some(version),
            parent: None,
            dependencies: Vec::new(),
            plugins: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Set the parent reference
    pub fn with_parent(mut self, parent: Coordinate) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Add a dependency declaration
    pub fn with_dependency(mut self, dependency: DependencyDecl) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Add a plugin binding
    pub fn with_plugin(mut self, binding: PluginBinding) -> Self {
        self.plugins.push(binding);
        self
    }

    /// Set a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The coordinate identifying this definition
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.group.clone(), self.name.clone())
    }

    /// Parse a definition from its JSON form
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}
