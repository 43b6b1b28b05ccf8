//! Icon cache
//!
//! `IconCacheManager` keeps fetched icons in memory under a byte capacity
//! bound with least-recently-used eviction, coalesces concurrent fetches of
//! the same icon, and can mirror its contents to disk so they survive a
//! restart.

mod disk;
mod manager;
mod stats;
mod store;

pub use disk::{DiskCache, PersistedIcon};
pub use manager::{IconCacheManager, PrefetchReport};
pub use stats::CacheStats;
pub use store::{CacheEntry, CacheStore};
