//! Cache statistics

use serde::Serialize;

/// Running counters; reset only by `clear_cache`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub failures: u64,
}

/// Snapshot returned by `IconCacheManager::get_cache_stats`
///
/// `count` and `total_bytes` are derived from the store at the time of the
/// call; the remaining counters are cumulative since creation or the last clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of committed entries
    pub count: u64,
    /// Summed payload size of committed entries
    pub total_bytes: u64,
    /// Requests that found a committed entry
    pub hits: u64,
    /// Requests that found no committed entry
    pub misses: u64,
    /// Entries removed to stay within the capacity bound
    pub evictions: u64,
    /// Fetches that completed with an error
    pub failures: u64,
    /// Identifiers currently being fetched
    pub in_flight: u64,
    /// Configured capacity bound
    pub capacity_bytes: u64,
}
