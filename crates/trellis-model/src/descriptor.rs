//! Persisted component metadata
//!
//! A `ComponentDescriptor` is the unit stored in the component repository:
//! identity plus direct dependency coordinates, serialized as
//! `<name>-<version>.json` next to the artifact.

use crate::Coordinate;
use semver::Version;
use serde::{Deserialize, Serialize};

/// Persisted metadata for an installable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub group: String,
    pub name: String,
    pub version: Version,
    #[serde(default)]
    pub dependencies: Vec<DescriptorDependency>,
}

/// A direct dependency listed by a descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorDependency {
    pub group: String,
    pub name: String,
    pub version: Version,
}

impl ComponentDescriptor {
    /// Create a descriptor with no dependencies
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version,
            dependencies: Vec::new(),
        }
    }

    /// Add direct dependencies
    pub fn with_dependencies(mut self, dependencies: Vec<DescriptorDependency>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// The coordinate this descriptor belongs to
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.group.clone(), self.name.clone())
    }

    /// Descriptor file name: `<name>-<version>.json`
    pub fn file_name(&self) -> String {
        Self::file_name_for(&self.name, &self.version)
    }

    /// Descriptor file name for a component that may not be loaded yet
    pub fn file_name_for(name: &str, version: &Version) -> String {
        format!("{}-{}.json", name, version)
    }

    /// Parse a descriptor from its JSON form
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Serialize to the JSON form stored in the repository
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl DescriptorDependency {
    /// Create a descriptor dependency entry
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version,
        }
    }

    /// The coordinate of this dependency
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.group.clone(), self.name.clone())
    }
}
