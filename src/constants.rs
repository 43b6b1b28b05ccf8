//! Constants exported to the host runtime
//!
//! Computed once when the manager is built and never changed afterwards.

use serde::Serialize;

use crate::config::{CacheConfig, FailurePolicy};

/// Crate version reported in the constants
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration values fixed at load time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConstants {
    pub capacity_bytes: u64,
    pub failure_policy: FailurePolicy,
    pub api_base_url: String,
    /// Whether entries survive a process restart
    pub persistent: bool,
    pub cache_dir: Option<String>,
    pub version: &'static str,
}

impl ModuleConstants {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            capacity_bytes: config.capacity_bytes,
            failure_policy: config.failure_policy,
            api_base_url: config.api_base_url.clone(),
            persistent: config.persist_dir.is_some(),
            cache_dir: config
                .persist_dir
                .as_ref()
                .map(|dir| dir.to_string_lossy().into_owned()),
            version: VERSION,
        }
    }
}
