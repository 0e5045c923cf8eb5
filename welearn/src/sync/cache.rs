use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::paths::sibling_with_suffix;

pub const LINK_CACHE_FILE: &str = ".link_cache";
pub const COURSE_CACHE_FILE: &str = ".course_cache";
pub const EVENT_CACHE_FILE: &str = ".welearn_event_cache";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A string-keyed map persisted as one JSON object.
///
/// Loading never fails: a missing or unreadable file yields an empty cache and
/// entries whose value does not match `V` are dropped. Keys are kept sorted so
/// that flushing unchanged contents reproduces the same bytes.
#[derive(Debug, Clone)]
pub struct JsonCache<V> {
    path: PathBuf,
    entries: BTreeMap<String, V>,
}

/// Resource URL -> remote `timemodified` of the last successful download.
pub type LinkCache = JsonCache<i64>;

impl<V> JsonCache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "cache file absent, starting empty");
                return Self::empty(path);
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "cache file unreadable, starting empty: {err}"
                );
                return Self::empty(path);
            }
        };
        let entries = Self::decode(&path, &bytes);
        tracing::info!(path = %path.display(), entries = entries.len(), "cache loaded");
        Self { path, entries }
    }

    fn decode(path: &Path, bytes: &[u8]) -> BTreeMap<String, V> {
        let raw: BTreeMap<String, Value> = match serde_json::from_slice(bytes) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    "cache file malformed, starting empty: {err}"
                );
                return BTreeMap::new();
            }
        };
        raw.into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<V>(value) {
                Ok(value) => Some((key, value)),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        key = %key,
                        "dropping invalid cache entry: {err}"
                    );
                    None
                }
            })
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        self.entries.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &V)> {
        self.entries.iter()
    }

    /// Overwrites the whole file through a temporary sibling and a rename.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(&self.entries)?;
        let temp = sibling_with_suffix(&self.path, "tmp");
        let io_err = |source: io::Error| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = tokio::fs::File::create(&temp).await.map_err(io_err)?;
        file.write_all(&bytes).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        if let Err(err) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(io_err(err));
        }
        tracing::info!(path = %self.path.display(), entries = self.entries.len(), "cache flushed");
        Ok(())
    }
}
