//! Trellis project model
//!
//! In-memory representation of project definitions: coordinates, version
//! specs, dependency declarations, plugin bindings, component descriptors,
//! and the parent-to-child cascade producing effective definitions.

pub mod coordinate;
pub mod definition;
pub mod descriptor;
pub mod effective;
pub mod options;
pub mod stage;

pub use coordinate::{Coordinate, DependencyDecl, Scope, VersionSpec};
pub use definition::{PluginBinding, ProjectDefinition};
pub use descriptor::{ComponentDescriptor, DescriptorDependency};
pub use effective::{effective_definition, EffectiveDefinition};
pub use options::{OptionKind, OptionValue};
pub use stage::Stage;

/// Project definition errors
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("required key '{key}' is absent for '{definition}' after cascade resolution")]
    MissingKey { definition: String, key: String },

    #[error("cyclic parent chain: {0}")]
    CyclicParentChain(String),

    #[error("definition '{child}' references unknown parent '{parent}'")]
    UnknownParent { child: String, parent: String },

    #[error("unknown property '{name}' referenced from '{placeholder}'")]
    UnknownProperty { name: String, placeholder: String },

    #[error("invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },
}

impl DefinitionError {
    /// Create a missing key error
    pub fn missing_key(definition: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingKey {
            definition: definition.into(),
            key: key.into(),
        }
    }

    /// Create an unknown parent error
    pub fn unknown_parent(child: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::UnknownParent {
            child: child.into(),
            parent: parent.into(),
        }
    }
}

pub type DefinitionResult<T> = Result<T, DefinitionError>;
