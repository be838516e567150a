//! Remote-backed caching repository
//!
//! The network transport lives behind [`RemoteSource`]; this module only
//! supplies the miss-then-fetch-then-retry policy around a local cache.

use crate::{ComponentStore, LocalRepository, RepositoryError, RepositoryResult};
use log::{debug, info};
use semver::Version;
use std::path::PathBuf;
use trellis_model::{ComponentDescriptor, Coordinate};
use trellis_resolver::{ComponentSource, ResolverError, ResolverResult};

/// A component fetched from a remote source
#[derive(Debug, Clone)]
pub struct FetchedComponent {
    pub artifact: Vec<u8>,
    pub descriptor: ComponentDescriptor,
}

/// Remote lookup contract; fetches must be idempotent
pub trait RemoteSource {
    /// Fetch one concrete component
    fn fetch(&self, coordinate: &Coordinate, version: &Version)
        -> RepositoryResult<FetchedComponent>;

    /// Enumerate versions published for a coordinate
    fn versions(&self, coordinate: &Coordinate) -> RepositoryResult<Vec<Version>>;
}

/// A local repository populated on demand from a remote source
pub struct CachingRepository<R> {
    local: LocalRepository,
    remote: R,
}

impl<R: RemoteSource> CachingRepository<R> {
    pub fn new(local: LocalRepository, remote: R) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &LocalRepository {
        &self.local
    }

    /// Fetch a missing component into the cache, then retry the local
    /// lookup. A miss retries the remote exactly once before becoming
    /// fatal.
    fn ensure_cached(&self, coordinate: &Coordinate, version: &Version) -> RepositoryResult<()> {
        if self.local.has(coordinate, version) {
            return Ok(());
        }
        info!("cache miss for {}@{}, fetching", coordinate, version);
        let fetched = self.remote.fetch(coordinate, version)?;
        self.local
            .install(coordinate, version, &fetched.artifact, &fetched.descriptor)
    }
}

impl<R: RemoteSource> ComponentStore for CachingRepository<R> {
    fn has(&self, coordinate: &Coordinate, version: &Version) -> bool {
        self.local.has(coordinate, version)
    }

    fn descriptor(
        &self,
        coordinate: &Coordinate,
        version: &Version,
    ) -> RepositoryResult<ComponentDescriptor> {
        self.ensure_cached(coordinate, version)?;
        ComponentStore::descriptor(&self.local, coordinate, version)
    }

    fn artifact(&self, coordinate: &Coordinate, version: &Version) -> RepositoryResult<PathBuf> {
        self.ensure_cached(coordinate, version)?;
        self.local.artifact(coordinate, version)
    }

    fn install(
        &self,
        coordinate: &Coordinate,
        version: &Version,
        artifact: &[u8],
        descriptor: &ComponentDescriptor,
    ) -> RepositoryResult<()> {
        self.local.install(coordinate, version, artifact, descriptor)
    }

    fn available_versions(&self, coordinate: &Coordinate) -> RepositoryResult<Vec<Version>> {
        let mut versions = ComponentStore::available_versions(&self.local, coordinate)?;
        match self.remote.versions(coordinate) {
            Ok(remote) => {
                for version in remote {
                    if !versions.contains(&version) {
                        versions.push(version);
                    }
                }
            }
            Err(e) => {
                // The local cache alone can still satisfy the build.
                debug!("remote version listing failed for {}: {}", coordinate, e);
            }
        }
        versions.sort();
        Ok(versions)
    }
}

impl<R: RemoteSource> ComponentSource for CachingRepository<R> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapRemote {
        components: BTreeMap<(Coordinate, Version), FetchedComponent>,
        fetches: AtomicUsize,
    }

    impl MapRemote {
        fn new(components: BTreeMap<(Coordinate, Version), FetchedComponent>) -> Self {
            Self {
                components,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl RemoteSource for MapRemote {
        fn fetch(
            &self,
            coordinate: &Coordinate,
            version: &Version,
        ) -> RepositoryResult<FetchedComponent> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.components
                .get(&(coordinate.clone(), version.clone()))
                .cloned()
                .ok_or_else(|| RepositoryError::not_found(coordinate, version))
        }

        fn versions(&self, coordinate: &Coordinate) -> RepositoryResult<Vec<Version>> {
            Ok(self
                .components
                .keys()
                .filter(|(c, _)| c == coordinate)
                .map(|(_, v)| v.clone())
                .collect())
        }
    }

    fn coordinate() -> Coordinate {
        Coordinate::new("io.trellis.plugins", "archive")
    }

    fn remote_with(version: Version) -> MapRemote {
        let descriptor =
            ComponentDescriptor::new("io.trellis.plugins", "archive", version.clone());
        MapRemote::new(
            [(
                (coordinate(), version),
                FetchedComponent {
                    artifact: b"remote-bytes".to_vec(),
                    descriptor,
                },
            )]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn miss_fetches_once_then_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let version = Version::new(1, 0, 0);
        let repository = CachingRepository::new(
            LocalRepository::open(dir.path()).unwrap(),
            remote_with(version.clone()),
        );

        let first = ComponentStore::descriptor(&repository, &coordinate(), &version).unwrap();
        let second = ComponentStore::descriptor(&repository, &coordinate(), &version).unwrap();
        assert_eq!(first, second);
        assert_eq!(repository.remote.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn miss_everywhere_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let repository = CachingRepository::new(
            LocalRepository::open(dir.path()).unwrap(),
            MapRemote::new(BTreeMap::new()),
        );

        let result =
            ComponentStore::descriptor(&repository, &coordinate(), &Version::new(1, 0, 0));
        assert!(matches!(result, Err(RepositoryError::ComponentNotFound { .. })));
    }

    #[test]
    fn available_versions_union_local_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalRepository::open(dir.path()).unwrap();
        let installed = Version::new(0, 9, 0);
        local
            .install(
                &coordinate(),
                &installed,
                b"x",
                &ComponentDescriptor::new("io.trellis.plugins", "archive", installed.clone()),
            )
            .unwrap();

        let repository = CachingRepository::new(local, remote_with(Version::new(1, 0, 0)));
        let versions = ComponentStore::available_versions(&repository, &coordinate()).unwrap();
        assert_eq!(versions, vec![Version::new(0, 9, 0), Version::new(1, 0, 0)]);
    }
}
