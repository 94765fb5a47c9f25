//! Local fallback storage for preferences.
//!
//! A synchronous string key/value store used only in degraded mode (no
//! session, or server unreachable). Keys arrive already namespaced by the
//! preference store.

use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Synchronous key/value store used when the server cannot be reached.
pub trait FallbackStore: Send + Sync {
    /// Read the raw stored string for `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`. Failures are logged, never returned.
    fn set(&self, key: &str, value: String);
}

/// Process-local fallback store.
#[derive(Clone, Default)]
pub struct MemoryFallbackStore {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryFallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl FallbackStore for MemoryFallbackStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.inner.insert(key.to_string(), value);
    }
}

/// Fallback store mirrored to a JSON file.
///
/// The file is read once at construction and rewritten after every change,
/// so a later process observes earlier writes.
pub struct FileFallbackStore {
    inner: DashMap<String, String>,
    path: PathBuf,
}

impl FileFallbackStore {
    /// Open the store, loading existing entries if the file exists.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = DashMap::new();

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let map: HashMap<String, String> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                inner.insert(k, v);
            }
            tracing::debug!(path = %path.display(), entries = inner.len(), "Loaded fallback store");
        }

        Ok(Self { inner, path })
    }

    fn save(&self) -> std::io::Result<()> {
        let map: HashMap<String, String> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(writer, &map)?;
        Ok(())
    }

    fn save_logged(&self) {
        if let Err(e) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write fallback store");
        }
    }
}

impl FallbackStore for FileFallbackStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: &str, value: String) {
        self.inner.insert(key.to_string(), value);
        self.save_logged();
    }
}
