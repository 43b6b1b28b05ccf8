//! Cache configuration
//!
//! `CacheConfig` is fixed when the manager is constructed. The library default
//! is a purely in-memory cache; the CLI turns on disk persistence.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::CacheError;

/// Public Iconify API
pub const DEFAULT_API_BASE_URL: &str = "https://api.iconify.design";

/// Default capacity bound: 4 MiB of icon payload
pub const DEFAULT_CAPACITY_BYTES: u64 = 4 * 1024 * 1024;

/// Default per-request fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How `prefetch_icons` reports per-icon fetch failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Failures are collected in the report; the call still succeeds
    #[default]
    BestEffort,
    /// Any failure makes the whole call fail with `PrefetchFailed`
    Fatal,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::BestEffort => f.write_str("bestEffort"),
            FailurePolicy::Fatal => f.write_str("fatal"),
        }
    }
}

/// Configuration for an `IconCacheManager`
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on the summed payload size of all cached icons
    pub capacity_bytes: u64,
    /// Whether a failed fetch fails the whole prefetch call
    pub failure_policy: FailurePolicy,
    /// Base URL of the Iconify compatible API used by `HttpFetcher`
    pub api_base_url: String,
    /// Per-request timeout for `HttpFetcher`
    pub fetch_timeout: Duration,
    /// Directory to persist entries in; `None` keeps the cache in memory only
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            failure_policy: FailurePolicy::BestEffort,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            persist_dir: None,
        }
    }
}

impl CacheConfig {
    /// Checks the configuration before a manager is built from it
    ///
    /// # Returns
    /// * `Ok(())` if the configuration is usable
    /// * `Err(CacheError::CapacityMisconfigured)` for a zero capacity
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.capacity_bytes == 0 {
            return Err(CacheError::CapacityMisconfigured(self.capacity_bytes));
        }
        Ok(())
    }

    /// Builds a configuration from parsed CLI arguments
    ///
    /// The CLI persists to the XDG cache directory (`~/.cache/iconcache/` on
    /// Linux) unless `--cache-dir` overrides it or `--no-persist` is given, so
    /// separate invocations share one cache.
    pub fn from_cli(cli: &Cli) -> Self {
        let persist_dir = if cli.no_persist {
            None
        } else {
            cli.cache_dir.clone().or_else(default_persist_dir)
        };

        Self {
            capacity_bytes: cli.capacity,
            failure_policy: if cli.fatal {
                FailurePolicy::Fatal
            } else {
                FailurePolicy::BestEffort
            },
            api_base_url: cli.api_url.clone(),
            fetch_timeout: Duration::from_secs(cli.timeout_secs),
            persist_dir,
        }
    }
}

/// XDG-compliant cache directory, if a home directory can be determined
pub fn default_persist_dir() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "iconcache")?;
    Some(project_dirs.cache_dir().to_path_buf())
}
