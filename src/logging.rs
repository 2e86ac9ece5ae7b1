//! Tracing subscriber setup.
//!
//! Text and JSON modes log to stderr. The TUI owns the terminal, so in that mode logs
//! go to `<cache dir>/rbi-cli/rbi-cli.log` instead.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "rbi_cli=info";
const VERBOSE_FILTER: &str = "rbi_cli=debug";

pub fn log_file_path() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("no cache directory available")?;
    Ok(base.join("rbi-cli").join("rbi-cli.log"))
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. `RUST_LOG` applies unless `verbose` is set.
pub fn init_tracing(verbose: bool, to_file: bool) -> Result<()> {
    let filter = env_filter(verbose);

    if to_file {
        let path = log_file_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .try_init()
            .context("install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .context("install tracing subscriber")?;
    }
    Ok(())
}
