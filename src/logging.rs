//! Tracing bootstrap honoring the `log` config section

use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LogConfig;
use crate::error::{Error, Result};

/// Initialize the global subscriber.
///
/// `verbose` forces debug level regardless of the configured one. When
/// `log.file` is set, output goes there instead of stdout.
pub fn init(config: &LogConfig, verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camscout={level}")));

    let json = config.format == "json";

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if config.file.is_empty() {
        if json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .boxed()
        }
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.file)
            .map_err(|e| Error::Config(format!("cannot open log file {}: {e}", config.file)))?;
        let writer = Mutex::new(file);
        if json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("logger init failed: {e}")))?;

    Ok(())
}
