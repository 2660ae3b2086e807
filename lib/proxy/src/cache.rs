//! The shared response cache: a fixed-capacity, URI-hash-keyed map with
//! LRU eviction, guarded by a single mutex owned by `servers/http-proxy`'s
//! `main` and threaded through every connection handler.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Above this many entries, the slot with the oldest `last_used` is evicted
/// on insert, per §4.G step 10.
pub const MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub expires_at: u64,
    pub last_used: u64,
    pub response: Vec<u8>,
}

/// Hashes the absolute request URI into the 64-bit cache key from §3/§4.G.
pub fn hash_uri(uri: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    uri.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<u64, CacheEntry>,
}

impl Cache {
    pub fn new() -> Cache {
        Cache {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: u64) -> Option<&CacheEntry> {
        self.entries.get(&key)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut CacheEntry> {
        self.entries.get_mut(&key)
    }

    /// Inserts or replaces the entry for `key`, evicting the least recently
    /// used entry if the cache is now over `MAX_ENTRIES`.
    pub fn insert(&mut self, key: u64, entry: CacheEntry) {
        self.entries.insert(key, entry);
        if self.entries.len() > MAX_ENTRIES {
            if let Some(&lru_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key)
            {
                self.entries.remove(&lru_key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best-effort diagnostic summary for the SIGUSR1 handler: number of
    /// entries and their ages relative to `now`. Never errors, never
    /// panics, intended to be called without holding the lock.
    pub fn summary(&self, now: u64) -> Vec<(u64, bool)> {
        self.entries
            .iter()
            .map(|(key, entry)| (*key, now < entry.expires_at))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(expires_at: u64, last_used: u64) -> CacheEntry {
        CacheEntry {
            expires_at,
            last_used,
            response: Vec::new(),
        }
    }

    #[test]
    fn hash_uri_is_stable_and_distinguishes_distinct_uris() {
        assert_eq!(hash_uri("http://a/b"), hash_uri("http://a/b"));
        assert_ne!(hash_uri("http://a/b"), hash_uri("http://a/c"));
    }

    #[test]
    fn insert_evicts_least_recently_used_past_capacity() {
        let mut cache = Cache::new();
        for i in 0..MAX_ENTRIES as u64 {
            cache.insert(i, entry(1_000, i));
        }
        assert_eq!(cache.len(), MAX_ENTRIES);

        cache.insert(999, entry(1_000, 500));
        assert_eq!(cache.len(), MAX_ENTRIES);
        assert!(cache.get(0).is_none());
        assert!(cache.get(999).is_some());
    }

    #[test]
    fn get_mut_allows_refreshing_last_used() {
        let mut cache = Cache::new();
        cache.insert(1, entry(1_000, 0));
        cache.get_mut(1).unwrap().last_used = 42;
        assert_eq!(cache.get(1).unwrap().last_used, 42);
    }
}
