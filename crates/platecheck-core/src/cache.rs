//! Process-wide dataset cache with per-entry freshness policies.
//!
//! Each entry carries a [`Freshness`] token: either the upstream version it
//! was built from (valid until a different version is observed) or an
//! absolute expiry. Stale entries are never served. Entries live in a moka
//! cache, which collapses concurrent misses for one key into a single fetch,
//! and can optionally be mirrored to disk so they survive restarts.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Decides whether a cache entry may still be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Freshness {
    /// Fresh until upstream reports a different version token.
    Version(String),
    /// Fresh while `now < expiry`.
    Expires(DateTime<Utc>),
}

impl Freshness {
    pub fn expires_after(now: DateTime<Utc>, ttl: Duration) -> Self {
        Freshness::Expires(now + ttl)
    }

    /// `upstream` is the version currently advertised by the source, if it
    /// could be determined. An unknown upstream version never invalidates.
    pub fn is_fresh(&self, now: DateTime<Utc>, upstream: Option<&str>) -> bool {
        match self {
            Freshness::Version(v) => upstream.is_none_or(|u| u == v),
            Freshness::Expires(at) => now < *at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub freshness: Freshness,
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, freshness: Freshness, stored_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            freshness,
            stored_at,
        }
    }
}

/// One JSON file per key under a directory, replaced atomically.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    /// Missing, unreadable and corrupt files all read as `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache file unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cache file corrupt, ignoring");
                None
            }
        }
    }

    pub fn store<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) -> Result<(), AppError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(entry)?;
        std::fs::create_dir_all(&self.dir)
            .and_then(|_| std::fs::write(&tmp, json))
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| AppError::CacheError(format!("{}: {e}", path.display())))
    }

    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }

    /// Keys of every persisted entry.
    pub fn keys(&self) -> Vec<String> {
        let Ok(dir) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        dir.filter_map(Result::ok)
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect()
    }
}

/// Upper bound on in-memory entries per cache. Keys are a handful of
/// dataset names, so this is never reached in practice.
const MAX_ENTRIES: u64 = 64;

struct Inner<T> {
    name: &'static str,
    entries: Cache<String, Arc<CacheEntry<T>>>,
    disk: Option<DiskStore>,
}

/// Shared cache handle. Cloning is cheap and clones share entries.
pub struct CacheLayer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CacheLayer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CacheLayer<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn in_memory(name: &'static str) -> Self {
        Self::build(name, None)
    }

    pub fn with_disk(name: &'static str, store: DiskStore) -> Self {
        Self::build(name, Some(store))
    }

    fn build(name: &'static str, disk: Option<DiskStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                entries: Cache::builder().name(name).max_capacity(MAX_ENTRIES).build(),
                disk,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Current entry regardless of freshness. Falls back to disk on a cold miss.
    pub async fn get(&self, key: &str) -> Option<Arc<CacheEntry<T>>> {
        if let Some(entry) = self.inner.entries.get(key).await {
            return Some(entry);
        }
        let entry = Arc::new(self.inner.disk.as_ref()?.load::<T>(key)?);
        tracing::debug!(cache = self.inner.name, key, "Loaded entry from disk");
        self.inner
            .entries
            .insert(key.to_string(), Arc::clone(&entry))
            .await;
        Some(entry)
    }

    /// Entry if it may be served at `now` given the upstream version.
    /// A stale entry is dropped on sight.
    pub async fn get_fresh(
        &self,
        key: &str,
        now: DateTime<Utc>,
        upstream: Option<&str>,
    ) -> Option<Arc<CacheEntry<T>>> {
        let entry = self.get(key).await?;
        if entry.freshness.is_fresh(now, upstream) {
            Some(entry)
        } else {
            tracing::info!(cache = self.inner.name, key, "Cache entry stale, invalidating");
            self.invalidate(key).await;
            None
        }
    }

    /// Store an entry (last writer wins). Disk failures are logged, not returned.
    pub async fn put(&self, key: &str, entry: CacheEntry<T>) -> Arc<CacheEntry<T>> {
        self.persist(key, &entry);
        let entry = Arc::new(entry);
        self.inner
            .entries
            .insert(key.to_string(), Arc::clone(&entry))
            .await;
        entry
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.entries.invalidate(key).await;
        if let Some(disk) = &self.inner.disk {
            disk.remove(key);
        }
    }

    /// Load every persisted entry into memory. Returns how many were loaded.
    pub async fn warm(&self) -> usize {
        let Some(disk) = &self.inner.disk else {
            return 0;
        };
        let mut loaded = 0;
        for key in disk.keys() {
            if let Some(entry) = disk.load::<T>(&key) {
                self.inner.entries.insert(key, Arc::new(entry)).await;
                loaded += 1;
            }
        }
        if loaded > 0 {
            tracing::info!(cache = self.inner.name, loaded, "Warmed cache from disk");
        }
        loaded
    }

    /// Serve a fresh entry, or run `fetch` and cache its result.
    ///
    /// Concurrent callers missing on the same key wait for a single fetch and
    /// then share its result, error included. A failed fetch caches nothing.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        now: DateTime<Utc>,
        upstream: Option<&str>,
        fetch: F,
    ) -> Result<Arc<CacheEntry<T>>, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(T, Freshness), AppError>>,
    {
        if let Some(entry) = self.get_fresh(key, now, upstream).await {
            return Ok(entry);
        }

        self.inner
            .entries
            .try_get_with(key.to_string(), async move {
                let (payload, freshness) = fetch().await?;
                tracing::info!(cache = self.inner.name, key, ?freshness, "Cache refreshed");
                let entry = CacheEntry::new(payload, freshness, now);
                self.persist(key, &entry);
                Ok::<_, AppError>(Arc::new(entry))
            })
            .await
            .map_err(AppError::from_shared)
    }

    fn persist(&self, key: &str, entry: &CacheEntry<T>) {
        if let Some(disk) = &self.inner.disk
            && let Err(e) = disk.store(key, entry)
        {
            tracing::warn!(
                cache = self.inner.name,
                key,
                error = %e,
                "Failed to persist cache entry"
            );
        }
    }
}
