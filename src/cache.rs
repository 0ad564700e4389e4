//! Memoized read views.
//!
//! Values are stored serialized, keyed by view and viewer, and expire after a
//! per-entry TTL. Mutations remove whole keys through the `forget_*` helpers;
//! nothing is ever patched in place and reads never invalidate.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{ProjectId, UserId};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to encode cached view '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Injectable key-value store with per-entry expiry.
pub trait ViewCache {
    fn get(&mut self, key: &str) -> Option<Vec<u8>>;
    fn put(&mut self, key: String, value: Vec<u8>, ttl: Duration);
    /// Returns whether a live or expired entry was removed.
    fn forget(&mut self, key: &str) -> bool;
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-local cache; lives as long as the process does.
#[derive(Default)]
pub struct MemoryCache {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| !e.is_expired(Instant::now()))
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl ViewCache for MemoryCache {
    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    fn put(&mut self, key: String, value: Vec<u8>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key, CacheEntry { value, expires_at });
    }

    fn forget(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }
}

/// Read-through lookup: a hit is returned as stored, a miss runs `load` and
/// stores its result for `ttl`.
pub fn remember<T, E, F>(cache: &mut dyn ViewCache, key: &str, ttl: Duration, load: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    E: From<CacheError>,
    F: FnOnce() -> Result<T, E>,
{
    if let Some(bytes) = cache.get(key) {
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "view served from cache");
                return Ok(value);
            }
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cached view");
                cache.forget(key);
            }
        }
    }

    let value = load()?;
    let bytes = serde_json::to_vec(&value).map_err(|e| CacheError::Encode {
        key: key.to_string(),
        source: e,
    })?;
    cache.put(key.to_string(), bytes, ttl);
    Ok(value)
}

pub fn project_detail_key(project_id: ProjectId, viewer_id: UserId) -> String {
    format!("project_details_{project_id}_{viewer_id}")
}

pub fn team_listing_key(viewer_id: UserId) -> String {
    format!("user_teams_{viewer_id}")
}

/// Drops the project detail view of `project_id` for every given viewer.
pub fn forget_project_detail<I>(cache: &mut dyn ViewCache, project_id: ProjectId, viewers: I)
where
    I: IntoIterator<Item = UserId>,
{
    for viewer in viewers {
        cache.forget(&project_detail_key(project_id, viewer));
    }
}

/// Drops the team listing of every given viewer.
pub fn forget_team_listings<I>(cache: &mut dyn ViewCache, viewers: I)
where
    I: IntoIterator<Item = UserId>,
{
    for viewer in viewers {
        cache.forget(&team_listing_key(viewer));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_remember_loads_once_within_ttl() {
        let mut cache = MemoryCache::new();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok::<_, CacheError>(vec![String::from("alpha"), String::from("beta")])
        };

        let first: Vec<String> =
            remember(&mut cache, "k", Duration::from_secs(60), load).unwrap();
        let second: Vec<String> =
            remember(&mut cache, "k", Duration::from_secs(60), load).unwrap();

        assert_eq!(first, second);
        assert_eq!(loads.get(), 1);
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_expired_entries_are_reloaded() {
        let mut cache = MemoryCache::new();
        let loads = Cell::new(0);
        let load = || {
            loads.set(loads.get() + 1);
            Ok::<_, CacheError>(loads.get())
        };

        let first: i32 = remember(&mut cache, "k", Duration::ZERO, load).unwrap();
        let second: i32 = remember(&mut cache, "k", Duration::ZERO, load).unwrap();

        assert_eq!((first, second), (1, 2));
    }

    #[derive(Debug)]
    enum LoadError {
        Missing,
        Cache,
    }

    impl From<CacheError> for LoadError {
        fn from(_: CacheError) -> Self {
            LoadError::Cache
        }
    }

    #[test]
    fn test_failed_load_stores_nothing() {
        let mut cache = MemoryCache::new();
        let result: Result<i32, LoadError> =
            remember(&mut cache, "k", Duration::from_secs(60), || Err(LoadError::Missing));

        assert!(matches!(result, Err(LoadError::Missing)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_forget_helpers_remove_whole_keys() {
        let mut cache = MemoryCache::new();
        for viewer in [1, 2, 3] {
            cache.put(project_detail_key(9, viewer), b"{}".to_vec(), Duration::from_secs(60));
            cache.put(team_listing_key(viewer), b"[]".to_vec(), Duration::from_secs(60));
        }

        forget_project_detail(&mut cache, 9, [1, 2]);
        forget_team_listings(&mut cache, [3]);

        assert!(!cache.contains(&project_detail_key(9, 1)));
        assert!(!cache.contains(&project_detail_key(9, 2)));
        assert!(cache.contains(&project_detail_key(9, 3)));
        assert!(!cache.contains(&team_listing_key(3)));
        assert_eq!(cache.len(), 3);
    }
}
