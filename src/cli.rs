//! Command-line interface parsing for the icon cache
//!
//! Global flags configure the cache (see `CacheConfig::from_cli`); each
//! subcommand maps onto one manager operation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_CAPACITY_BYTES};

/// Icon cache - prefetch, inspect and clear cached icons
#[derive(Parser, Debug)]
#[command(name = "iconcache")]
#[command(about = "Prefetch and inspect a local icon cache")]
#[command(version)]
pub struct Cli {
    /// Capacity bound in bytes for all cached icon payloads
    #[arg(long, global = true, value_name = "BYTES", default_value_t = DEFAULT_CAPACITY_BYTES)]
    pub capacity: u64,

    /// Fail the whole prefetch if any icon fails to fetch
    #[arg(long, global = true)]
    pub fatal: bool,

    /// Base URL of the Iconify compatible icon API
    #[arg(long, global = true, value_name = "URL", default_value = DEFAULT_API_BASE_URL)]
    pub api_url: String,

    /// Per-request fetch timeout in seconds
    #[arg(long, global = true, value_name = "SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Directory to persist the cache in (defaults to the XDG cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only for this invocation
    #[arg(long, global = true)]
    pub no_persist: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, value_name = "FILTER", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Cache operations exposed by the CLI
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and cache the given icons (e.g. mdi:home mdi:account)
    Prefetch {
        /// Icon identifiers to prefetch
        #[arg(required = true, value_name = "ICON")]
        names: Vec<String>,
    },
    /// Print cache statistics as JSON
    Stats,
    /// Remove every cached icon and reset statistics
    Clear,
    /// Report whether an icon is cached (exit status 1 if it is not)
    Check {
        /// Icon identifier to look up
        name: String,
    },
    /// Write a cached icon's payload to stdout
    Get {
        /// Icon identifier to read
        name: String,
    },
    /// Print the cache constants as JSON
    Constants,
}
