//! Task result cache
//!
//! A handler that declares cache inputs is skipped when the sha256
//! fingerprint of those inputs matches the recorded one; its recorded
//! outputs are replayed instead. The cache is best effort: unreadable or
//! corrupt records are misses, and store failures never fail a build.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    fingerprint: String,
    outputs: Vec<PathBuf>,
}

/// Per-module task cache directory
#[derive(Debug, Clone)]
pub struct TaskCache {
    dir: PathBuf,
}

impl TaskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Recorded outputs for a task whose inputs still fingerprint the same
    pub fn lookup(&self, task: &str, fingerprint: &str) -> Option<Vec<PathBuf>> {
        let path = self.record_path(task);
        let content = fs::read_to_string(&path).ok()?;
        let record: CacheRecord = match serde_json::from_str(&content) {
            Ok(record) => record,
            Err(e) => {
                warn!("discarding corrupt cache record {}: {}", path.display(), e);
                return None;
            }
        };
        if record.fingerprint == fingerprint {
            debug!("cache hit for task '{}'", task);
            Some(record.outputs)
        } else {
            None
        }
    }

    /// Record a task's fingerprint and outputs
    pub fn store(&self, task: &str, fingerprint: &str, outputs: &[PathBuf]) {
        let record = CacheRecord {
            fingerprint: fingerprint.to_string(),
            outputs: outputs.to_vec(),
        };
        let result = fs::create_dir_all(&self.dir)
            .and_then(|()| {
                let json = serde_json::to_string(&record)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                fs::write(self.record_path(task), json)
            });
        if let Err(e) = result {
            warn!("failed to store cache record for '{}': {}", task, e);
        }
    }

    fn record_path(&self, task: &str) -> PathBuf {
        let safe: String = task
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

/// Fingerprint a task's input files: sha256 over each path and its
/// content, path-order independent. Returns `None` when any input is
/// unreadable, which forces the task to run.
pub fn fingerprint(task: &str, inputs: &[PathBuf]) -> Option<String> {
    let mut sorted: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    hasher.update(task.as_bytes());
    for path in sorted {
        hasher.update(path.to_string_lossy().as_bytes());
        let content = fs::read(path).ok()?;
        hasher.update(&content);
    }
    Some(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lookup_hits_only_on_matching_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TaskCache::new(dir.path().join("cache"));
        let outputs = vec![PathBuf::from("out/lib.a")];

        cache.store("compile", "abc123", &outputs);
        assert_eq!(cache.lookup("compile", "abc123"), Some(outputs));
        assert_eq!(cache.lookup("compile", "different"), None);
        assert_eq!(cache.lookup("unknown-task", "abc123"), None);
    }

    #[test]
    fn corrupt_record_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TaskCache::new(dir.path());
        cache.store("compile", "abc", &[]);
        fs::write(dir.path().join("compile.json"), "{ broken").unwrap();
        assert_eq!(cache.lookup("compile", "abc"), None);
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("main.src");
        fs::write(&input, "fn main() {}").unwrap();

        let first = fingerprint("compile", &[input.clone()]).unwrap();
        let same = fingerprint("compile", &[input.clone()]).unwrap();
        assert_eq!(first, same);

        fs::write(&input, "fn main() { changed() }").unwrap();
        let changed = fingerprint("compile", &[input]).unwrap();
        assert_ne!(first, changed);
    }

    #[test]
    fn fingerprint_is_input_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.src");
        let b = dir.path().join("b.src");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let forward = fingerprint("task", &[a.clone(), b.clone()]).unwrap();
        let reverse = fingerprint("task", &[b, a]).unwrap();
        assert_eq!(forward, reverse);
    }

    #[test]
    fn unreadable_input_disables_caching() {
        let missing = PathBuf::from("/no/such/input.src");
        assert_eq!(fingerprint("task", &[missing]), None);
    }
}
