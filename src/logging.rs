//! `tracing` setup for the host binary.
//!
//! All output goes to stderr: stdout carries nothing but rewritten messages.

use std::fmt as stdfmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "clean_urls=info,sqlx=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line, for log shippers.
    Json,
}

impl stdfmt::Display for LogFormat {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format `{}` (expected pretty, compact or json)", other),
        }
    }
}

/// `RUST_LOG` when set and valid, otherwise the crate's defaults.
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_logging(format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry()
        .with(env_filter())
        .with(ErrorLayer::default());
    let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    match format {
        LogFormat::Json => registry.with(layer.json()).try_init(),
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
    }
    .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    tracing::info!(format = %format, "Logging initialized");
    Ok(())
}
