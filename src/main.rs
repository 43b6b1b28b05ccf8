//! Icon cache CLI - prefetch, inspect and clear a local icon cache
//!
//! Icons are fetched from an Iconify compatible API and persisted in the XDG
//! cache directory so separate invocations share one cache.

use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, warn};

use iconcache::cli::{Cli, Command};
use iconcache::{CacheConfig, CacheError, HttpFetcher, IconCacheManager};

/// Installs the stderr log subscriber; `RUST_LOG` overrides `level`
fn setup_logging(level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let config = CacheConfig::from_cli(&cli);
    debug!(?config, "starting icon cache");

    let fetcher = HttpFetcher::from_config(&config)?;
    let manager = IconCacheManager::new(config, Arc::new(fetcher))?;

    match cli.command {
        Command::Prefetch { names } => {
            let report = manager.prefetch_icons(&names).await?;
            for name in &report.already_cached {
                println!("cached   {}", name);
            }
            for name in &report.fetched {
                println!("fetched  {}", name);
            }
            for (name, err) in &report.failed {
                eprintln!("failed   {}: {}", name, err);
            }
            if !report.is_complete() {
                warn!(failed = report.failed.len(), "prefetch finished with failures");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats => {
            print_json(&manager.get_cache_stats())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear => {
            manager.clear_cache();
            println!("cache cleared");
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { name } => {
            let cached = manager.is_cached(&name);
            println!("{}", cached);
            Ok(if cached { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Command::Get { name } => match manager.get_icon(&name) {
            Some(asset) => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&asset.data)?;
                stdout.flush()?;
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("{} is not cached", name);
                Ok(ExitCode::from(1))
            }
        },
        Command::Constants => {
            print_json(manager.constants())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            // Cache errors are reported as a {code, message} rejection
            match err.downcast_ref::<CacheError>() {
                Some(cache_err) => {
                    let payload = cache_err.to_payload();
                    match serde_json::to_string(&payload) {
                        Ok(json) => eprintln!("{}", json),
                        Err(_) => eprintln!("{}: {}", payload.code, payload.message),
                    }
                }
                None => eprintln!("error: {}", err),
            }
            ExitCode::FAILURE
        }
    }
}
