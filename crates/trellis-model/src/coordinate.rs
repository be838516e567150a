//! Coordinates, version specs and dependency declarations

use crate::DefinitionError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A (group, name) pair identifying a component or module, independent of
/// version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub name: String,
}

impl Coordinate {
    /// Create a new coordinate
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Group split on its `.` separator, used for repository path layout
    pub fn group_segments(&self) -> impl Iterator<Item = &str> {
        self.group.split('.')
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// A concrete version or a version range constraint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VersionSpec {
    /// Exactly this version
    Exact(Version),
    /// Any version matching the range
    Range(VersionReq),
}

impl VersionSpec {
    /// Parse a version spec: a concrete version first, a range otherwise
    pub fn parse(value: &str) -> Result<Self, DefinitionError> {
        if let Ok(version) = Version::parse(value) {
            return Ok(Self::Exact(version));
        }
        match VersionReq::parse(value) {
            Ok(req) => Ok(Self::Range(req)),
            Err(e) => Err(DefinitionError::InvalidVersion {
                value: value.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Check whether a concrete version satisfies this spec
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Exact(exact) => exact == version,
            Self::Range(req) => req.matches(version),
        }
    }

    /// The concrete version, if this spec is exact
    pub fn exact(&self) -> Option<&Version> {
        match self {
            Self::Exact(version) => Some(version),
            Self::Range(_) => None,
        }
    }
}

impl TryFrom<String> for VersionSpec {
    type Error = DefinitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionSpec> for String {
    fn from(spec: VersionSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(version) => write!(f, "{}", version),
            Self::Range(req) => write!(f, "{}", req),
        }
    }
}

/// Dependency scope: whether consumers need the dependency at runtime or
/// only while building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Build,
    #[default]
    Runtime,
}

impl Scope {
    /// Merge scopes from multiple consumers. A dependency needed at runtime
    /// by any consumer stays at runtime scope.
    pub fn merge(self, other: Scope) -> Scope {
        self.max(other)
    }
}

/// A declared dependency: coordinate plus version spec plus scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyDecl {
    pub coordinate: Coordinate,
    pub version: VersionSpec,
    #[serde(default)]
    pub scope: Scope,
}

impl DependencyDecl {
    /// Create a runtime-scoped dependency declaration
    pub fn new(coordinate: Coordinate, version: VersionSpec) -> Self {
        Self {
            coordinate,
            version,
            scope: Scope::Runtime,
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }
}
