//! Local filesystem repository

use crate::{ComponentStore, RepositoryError, RepositoryResult};
use log::{debug, warn};
use semver::Version;
use std::fs;
use std::path::{Path, PathBuf};
use trellis_model::{ComponentDescriptor, Coordinate};
use trellis_resolver::{ComponentSource, ResolverError, ResolverResult};

/// A repository rooted at a local directory
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Use an existing directory as repository root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Open a repository root, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> RepositoryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| RepositoryError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<group segments>/<name>`, the directory holding all
    /// installed versions of a coordinate
    fn coordinate_dir(&self, coordinate: &Coordinate) -> PathBuf {
        let mut dir = self.root.clone();
        for segment in coordinate.group_segments() {
            dir.push(segment);
        }
        dir.push(&coordinate.name);
        dir
    }

    fn version_dir(&self, coordinate: &Coordinate, version: &Version) -> PathBuf {
        self.coordinate_dir(coordinate).join(version.to_string())
    }

    fn descriptor_path(&self, coordinate: &Coordinate, version: &Version) -> PathBuf {
        self.version_dir(coordinate, version)
            .join(ComponentDescriptor::file_name_for(&coordinate.name, version))
    }

    fn artifact_name(coordinate: &Coordinate, version: &Version) -> String {
        format!("{}-{}.artifact", coordinate.name, version)
    }
}

impl ComponentStore for LocalRepository {
    fn has(&self, coordinate: &Coordinate, version: &Version) -> bool {
        self.descriptor_path(coordinate, version).is_file()
    }

    fn descriptor(
        &self,
        coordinate: &Coordinate,
        version: &Version,
    ) -> RepositoryResult<ComponentDescriptor> {
        let path = self.descriptor_path(coordinate, version);
        if !path.is_file() {
            return Err(RepositoryError::not_found(coordinate, version));
        }
        let content = fs::read_to_string(&path).map_err(|e| RepositoryError::io(&path, e))?;
        ComponentDescriptor::from_str(&content).map_err(|e| RepositoryError::corrupt(&path, e))
    }

    fn artifact(&self, coordinate: &Coordinate, version: &Version) -> RepositoryResult<PathBuf> {
        let path = self
            .version_dir(coordinate, version)
            .join(Self::artifact_name(coordinate, version));
        if !path.is_file() {
            return Err(RepositoryError::not_found(coordinate, version));
        }
        Ok(path)
    }

    fn install(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifact: &[u8],
        descriptor: &ComponentDescriptor,
    ) -> RepositoryResult<()> {
        let target = self.version_dir(coordinate, version);
        if self.has(coordinate, version) {
            debug!("{}@{} already installed", coordinate, version);
            return Ok(());
        }

        let parent = self.coordinate_dir(coordinate);
        fs::create_dir_all(&parent).map_err(|e| RepositoryError::io(&parent, e))?;

        // Stage the complete leaf next to the repository root, publish with
        // one rename.
        let staging =
            tempfile::tempdir_in(&self.root).map_err(|e| RepositoryError::io(&self.root, e))?;
        let artifact_path = staging.path().join(Self::artifact_name(coordinate, version));
        fs::write(&artifact_path, artifact).map_err(|e| RepositoryError::io(&artifact_path, e))?;
        let descriptor_path = staging
            .path()
            .join(ComponentDescriptor::file_name_for(&coordinate.name, version));
        let json = descriptor
            .to_json()
            .map_err(|e| RepositoryError::corrupt(&descriptor_path, e))?;
        fs::write(&descriptor_path, json).map_err(|e| RepositoryError::io(&descriptor_path, e))?;

        match fs::rename(staging.path(), &target) {
            Ok(()) => {
                debug!("installed {}@{}", coordinate, version);
                // The staged directory moved away; nothing left to clean up.
                std::mem::forget(staging);
                Ok(())
            }
            // A concurrent writer published the same component first; the
            // existing complete leaf wins and the staging dir is dropped.
            Err(_) if self.has(coordinate, version) => {
                debug!("{}@{} installed concurrently, keeping existing", coordinate, version);
                Ok(())
            }
            Err(e) => Err(RepositoryError::io(&target, e)),
        }
    }

    fn available_versions(&self, coordinate: &Coordinate) -> RepositoryResult<Vec<Version>> {
        let dir = self.coordinate_dir(coordinate);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| RepositoryError::io(&dir, e))?;
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RepositoryError::io(&dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            match Version::parse(name) {
                // Only complete installs (descriptor present) count.
                Ok(version) if self.has(coordinate, &version) => versions.push(version),
                Ok(_) => {}
                Err(_) => {
                    warn!("skipping non-version entry {} under {}", name, dir.display());
                }
            }
        }
        versions.sort();
        Ok(versions)
    }
}

impl ComponentSource for LocalRepository {
    fn available_versions(&self, coordinate: &Coordinate) -> ResolverResult<Vec<Version>> {
        ComponentStore::available_versions(self, coordinate)
            .map_err(|e| ResolverError::component(coordinate, e))
    }

    fn descriptor(
        &self,
        coordinate: &Coordinate,
        version: &Version,
    ) -> ResolverResult<ComponentDescriptor> {
        ComponentStore::descriptor(self, coordinate, version)
            .map_err(|e| ResolverError::component(coordinate, e))
    }
}
