//! Trellis component repository
//!
//! Lookup/install abstraction over a local content directory of installable
//! components. Layout:
//!
//! ```text
//! <root>/
//! └── <group segment>/.../<name>/<version>/
//!     ├── <name>-<version>.artifact
//!     └── <name>-<version>.json
//! ```
//!
//! Installs stage into a temporary directory and publish with one atomic
//! rename, so concurrent readers observe either the old or the new complete
//! state, never a partial one.

pub mod local;
pub mod remote;

pub use local::LocalRepository;
pub use remote::{CachingRepository, FetchedComponent, RemoteSource};

use semver::Version;
use std::path::PathBuf;
use trellis_model::{ComponentDescriptor, Coordinate};

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("component {coordinate}@{version} not found in repository")]
    ComponentNotFound { coordinate: String, version: String },

    #[error("corrupt descriptor at {path}: {reason}")]
    CorruptDescriptor { path: PathBuf, reason: String },

    #[error("repository I/O at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
}

impl RepositoryError {
    /// Create a component-not-found error
    pub fn not_found(coordinate: &Coordinate, version: &Version) -> Self {
        Self::ComponentNotFound {
            coordinate: coordinate.to_string(),
            version: version.to_string(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a corrupt-descriptor error
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptDescriptor {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Lookup/install contract over a component repository
pub trait ComponentStore {
    /// Whether a complete component is present
    fn has(&self, coordinate: &Coordinate, version: &Version) -> bool;

    /// Read the persisted descriptor of an installed component
    fn descriptor(
        &self,
        coordinate: &Coordinate,
        version: &Version,
    ) -> RepositoryResult<ComponentDescriptor>;

    /// Path of the installed artifact file
    fn artifact(&self, coordinate: &Coordinate, version: &Version) -> RepositoryResult<PathBuf>;

    /// Atomically install an artifact and its descriptor
    fn install(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifact: &[u8],
        descriptor: &ComponentDescriptor,
    ) -> RepositoryResult<()>;

    /// Enumerate installed versions of a coordinate, ascending
    fn available_versions(&self, coordinate: &Coordinate) -> RepositoryResult<Vec<Version>>;
}
