//! Expiring Key/Value Cache
//!
//! Generic TTL cache shared by enrichment adapters. Entries are evicted
//! lazily on read, not by a background sweep; a capacity cap drops the
//! oldest entry when full.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Cache entry with TTL tracking.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.inserted_at.elapsed() < self.ttl
    }
}

/// Expiring key/value store. Interior mutability so one instance can be
/// shared behind an `Arc` across workers; the lock covers single map
/// operations only.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(default_ttl, Self::DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            entries.retain(|_, e| e.is_valid());
            if entries.len() >= self.max_entries {
                if let Some(oldest) = entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone())
                {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Fetch a value; an expired entry is removed on the spot.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.is_valid() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().unwrap().remove(key).map(|e| e.value)
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Entry count including not-yet-collected expired entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn valid_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.is_valid())
            .count()
    }
}
