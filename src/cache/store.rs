//! In-memory icon store with byte accounting and LRU eviction

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::icon::{IconAsset, IconName};

/// A committed cache entry
///
/// Only `last_access` changes after insertion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached asset
    pub asset: IconAsset,
    /// Logical time of insertion
    pub inserted: u64,
    /// Logical time of the most recent access (equal to `inserted` until touched)
    pub last_access: u64,
    /// Wall-clock time the asset was cached
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn size(&self) -> u64 {
        self.asset.size()
    }

    /// Eviction order key: least recently accessed first, oldest insertion breaks ties
    fn lru_key(&self) -> (u64, u64) {
        (self.last_access, self.inserted)
    }
}

/// Keyed icon storage
///
/// Stamps come from a logical clock that only moves forward, so recency is
/// strict even when several operations land within one wall-clock tick.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<IconName, CacheEntry>,
    total_bytes: u64,
    clock: u64,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Inserts or replaces the entry for `name`
    pub fn insert(&mut self, name: IconName, asset: IconAsset, cached_at: DateTime<Utc>) {
        let stamp = self.tick();
        let entry = CacheEntry {
            asset,
            inserted: stamp,
            last_access: stamp,
            cached_at,
        };
        self.total_bytes += entry.size();
        if let Some(old) = self.entries.insert(name, entry) {
            self.total_bytes -= old.size();
        }
    }

    /// Marks `name` as accessed and returns a copy of its asset
    pub fn touch(&mut self, name: &IconName) -> Option<IconAsset> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(name)?;
        entry.last_access = stamp;
        Some(entry.asset.clone())
    }

    pub fn contains(&self, name: &IconName) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &IconName) -> Option<CacheEntry> {
        let entry = self.entries.remove(name)?;
        self.total_bytes -= entry.size();
        Some(entry)
    }

    /// Evicts least recently used entries, one at a time, until the total
    /// size is within `capacity`
    ///
    /// # Returns
    /// The evicted identifiers in eviction order
    pub fn evict_to_fit(&mut self, capacity: u64) -> Vec<IconName> {
        let mut evicted = Vec::new();
        while self.total_bytes > capacity {
            let Some(victim) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.lru_key())
                .map(|(name, _)| name.clone())
            else {
                break;
            };
            self.remove(&victim);
            evicted.push(victim);
        }
        evicted
    }

    /// Removes every entry; the logical clock keeps running
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
