//! Icon cache library
//!
//! Fetches icons through a pluggable `IconFetcher`, caches them under a byte
//! capacity bound and reports cache statistics. The CLI modules are exposed
//! for integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod icon;

pub use cache::{CacheStats, IconCacheManager, PrefetchReport};
pub use config::{CacheConfig, FailurePolicy};
pub use constants::ModuleConstants;
pub use error::{CacheError, ErrorPayload, FetchError};
pub use fetch::{BundledFetcher, HttpFetcher, IconFetcher};
pub use icon::{IconAsset, IconName};
