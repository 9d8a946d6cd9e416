//! Dependency-aware build cache.
//!
//! Tracks, for every generated output, which source files it was built from
//! and what those files looked like at the time. A file's "hash" is its
//! mtime and size, a cheap change marker rather than a content digest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use pagesmith_shared::{PagesmithError, Result};

/// Bumped whenever the on-disk layout changes; older caches are discarded.
pub const BUILD_VERSION: &str = "1";

/// Hash recorded for a dependency that does not exist.
const MISSING: &str = "missing";

/// One generated output and what it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedFile {
    pub timestamp: DateTime<Utc>,
    pub dependencies: Vec<String>,
    /// Dependency hashes at generation time.
    #[serde(default)]
    pub dependency_hashes: BTreeMap<String, String>,
}

/// The persisted cache document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCache {
    #[serde(default)]
    pub last_build: Option<DateTime<Utc>>,
    /// Latest observed hash per source file.
    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub generated_files: BTreeMap<String, GeneratedFile>,
    pub build_version: String,
    #[serde(skip)]
    path: PathBuf,
}

/// Current state of an output and its dependencies, captured from disk.
///
/// Capturing does I/O; deciding and recording do not. That split lets
/// concurrent tasks hash files without holding a lock on the cache.
#[derive(Debug, Clone)]
pub struct DependencySnapshot {
    output: String,
    output_exists: bool,
    dependencies: Vec<(String, String)>,
}

impl DependencySnapshot {
    pub async fn capture(output: &Path, dependencies: &[PathBuf]) -> Self {
        let output_exists = tokio::fs::try_exists(output).await.unwrap_or(false);
        let mut hashes = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            hashes.push((key(dep), file_hash(dep).await));
        }
        Self {
            output: key(output),
            output_exists,
            dependencies: hashes,
        }
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `"{mtime_ms}-{size}"`, or a fixed marker when the file is missing.
pub async fn file_hash(path: &Path) -> String {
    match tokio::fs::metadata(path).await {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis())
                .unwrap_or(0);
            format!("{mtime}-{}", meta.len())
        }
        Err(_) => MISSING.to_string(),
    }
}

impl BuildCache {
    /// An empty cache that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            last_build: None,
            file_hashes: BTreeMap::new(),
            generated_files: BTreeMap::new(),
            build_version: BUILD_VERSION.to_string(),
            path: path.into(),
        }
    }

    /// Load the cache from `path`. A missing, unparseable, or outdated cache
    /// yields an empty one; this never fails.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no build cache, starting fresh");
                return Self::empty(path);
            }
        };

        let mut cache: Self = match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "build cache is corrupt, resetting");
                return Self::empty(path);
            }
        };

        if cache.build_version != BUILD_VERSION {
            warn!(
                found = %cache.build_version,
                expected = BUILD_VERSION,
                "build cache version mismatch, resetting"
            );
            return Self::empty(path);
        }

        cache.path = path;
        cache
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `lastBuild` and write the cache atomically.
    pub async fn save(&mut self) -> Result<()> {
        self.last_build = Some(Utc::now());

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PagesmithError::storage(format!("build cache serialization failed: {e}")))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| PagesmithError::io(&dir, e))?;

        let temp = dir.join(format!(".build-cache.{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| PagesmithError::io(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| PagesmithError::io(&self.path, e))?;

        debug!(path = %self.path.display(), outputs = self.generated_files.len(), "build cache saved");
        Ok(())
    }

    /// Whether the snapshot's output must be regenerated: it is missing on
    /// disk, was never generated, its dependency list changed, or any
    /// dependency hash differs from the one recorded when it was generated.
    /// Current hashes are recorded in `fileHashes` along the way.
    pub fn should_rebuild(&mut self, snapshot: &DependencySnapshot) -> bool {
        for (dep, hash) in &snapshot.dependencies {
            self.file_hashes.insert(dep.clone(), hash.clone());
        }

        if !snapshot.output_exists {
            return true;
        }
        let Some(entry) = self.generated_files.get(&snapshot.output) else {
            return true;
        };

        let same_deps = entry.dependencies.len() == snapshot.dependencies.len()
            && entry
                .dependencies
                .iter()
                .zip(&snapshot.dependencies)
                .all(|(a, (b, _))| a == b);
        if !same_deps {
            return true;
        }

        snapshot
            .dependencies
            .iter()
            .any(|(dep, hash)| entry.dependency_hashes.get(dep) != Some(hash))
    }

    /// Record that the snapshot's output was generated from its dependencies.
    pub fn record_generated(&mut self, snapshot: &DependencySnapshot) {
        let mut dependency_hashes = BTreeMap::new();
        for (dep, hash) in &snapshot.dependencies {
            self.file_hashes.insert(dep.clone(), hash.clone());
            dependency_hashes.insert(dep.clone(), hash.clone());
        }

        self.generated_files.insert(
            snapshot.output.clone(),
            GeneratedFile {
                timestamp: Utc::now(),
                dependencies: snapshot.dependencies.iter().map(|(d, _)| d.clone()).collect(),
                dependency_hashes,
            },
        );
    }

    pub async fn should_rebuild_file(&mut self, output: &Path, dependencies: &[PathBuf]) -> bool {
        let snapshot = DependencySnapshot::capture(output, dependencies).await;
        self.should_rebuild(&snapshot)
    }

    pub async fn mark_file_generated(&mut self, output: &Path, dependencies: &[PathBuf]) {
        let snapshot = DependencySnapshot::capture(output, dependencies).await;
        self.record_generated(&snapshot);
    }

    /// Whether a source file differs from its last recorded hash (new files
    /// count as changed). Records the current hash.
    pub async fn has_changed(&mut self, path: &Path) -> bool {
        let hash = file_hash(path).await;
        let previous = self.file_hashes.insert(key(path), hash.clone());
        previous.as_deref() != Some(hash.as_str())
    }
}
