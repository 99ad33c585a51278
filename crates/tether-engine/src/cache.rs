//! Cache collaborator: a `(store, key)` → bytes map with optional expiry.
//!
//! The server talks to the cache only through [`CacheStore`]. A TTL of
//! zero or less means the entry never expires; a positive TTL expires it
//! that many seconds after the put. Expired entries read as absent and are
//! dropped lazily on access or eagerly by [`MemoryCache::purge_expired`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tether_core::CacheError;

use crate::sync::lock;

/// The four operations the bridge needs from a key/value collaborator.
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry. `Ok(None)` if absent or expired.
    fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Insert or overwrite. `ttl_seconds <= 0` means no expiry.
    fn put(&self, store: &str, key: &str, value: Vec<u8>, ttl_seconds: i64) -> Result<(), CacheError>;

    /// Whether a live entry exists.
    fn contains(&self, store: &str, key: &str) -> Result<bool, CacheError>;

    /// Remove an entry. Removing an absent entry succeeds.
    fn delete(&self, store: &str, key: &str) -> Result<(), CacheError>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live_at(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| now < t)
    }
}

fn check(store: &str, key: &str) -> Result<(), CacheError> {
    if store.is_empty() || key.is_empty() {
        Err(CacheError::InvalidKey)
    } else {
        Ok(())
    }
}

/// In-process [`CacheStore`].
#[derive(Default)]
pub struct MemoryCache {
    stores: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// [`get`](CacheStore::get) as of `now`.
    pub fn get_at(&self, store: &str, key: &str, now: Instant) -> Result<Option<Vec<u8>>, CacheError> {
        check(store, key)?;
        let mut stores = lock(&self.stores);
        let Some(entries) = stores.get_mut(store) else {
            return Ok(None);
        };
        match entries.get(key) {
            Some(e) if e.live_at(now) => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// [`put`](CacheStore::put) as of `now`.
    pub fn put_at(
        &self,
        store: &str,
        key: &str,
        value: Vec<u8>,
        ttl_seconds: i64,
        now: Instant,
    ) -> Result<(), CacheError> {
        check(store, key)?;
        let expires_at = u64::try_from(ttl_seconds)
            .ok()
            .filter(|&s| s > 0)
            .and_then(|s| now.checked_add(Duration::from_secs(s)));
        lock(&self.stores)
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    /// [`contains`](CacheStore::contains) as of `now`.
    pub fn contains_at(&self, store: &str, key: &str, now: Instant) -> Result<bool, CacheError> {
        check(store, key)?;
        Ok(lock(&self.stores)
            .get(store)
            .and_then(|entries| entries.get(key))
            .is_some_and(|e| e.live_at(now)))
    }

    /// Drop every entry in `store`. Returns how many were removed.
    pub fn clear(&self, store: &str) -> usize {
        lock(&self.stores).remove(store).map_or(0, |m| m.len())
    }

    /// Live keys in `store`, sorted.
    pub fn keys(&self, store: &str) -> Vec<String> {
        let now = Instant::now();
        let stores = lock(&self.stores);
        let mut keys: Vec<String> = stores
            .get(store)
            .into_iter()
            .flat_map(|entries| entries.iter())
            .filter(|(_, e)| e.live_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remove all entries expired as of `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut stores = lock(&self.stores);
        let mut removed = 0;
        for entries in stores.values_mut() {
            let before = entries.len();
            entries.retain(|_, e| e.live_at(now));
            removed += before - entries.len();
        }
        stores.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Total entries across all stores, expired or not.
    pub fn len(&self) -> usize {
        lock(&self.stores).values().map(HashMap::len).sum()
    }

    /// True if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.get_at(store, key, Instant::now())
    }

    fn put(&self, store: &str, key: &str, value: Vec<u8>, ttl_seconds: i64) -> Result<(), CacheError> {
        self.put_at(store, key, value, ttl_seconds, Instant::now())
    }

    fn contains(&self, store: &str, key: &str) -> Result<bool, CacheError> {
        self.contains_at(store, key, Instant::now())
    }

    fn delete(&self, store: &str, key: &str) -> Result<(), CacheError> {
        check(store, key)?;
        let mut stores = lock(&self.stores);
        if let Some(entries) = stores.get_mut(store) {
            entries.remove(key);
            if entries.is_empty() {
                stores.remove(store);
            }
        }
        Ok(())
    }
}
