//! Logging system configuration and initialization
//!
//! Console logging via tracing-subscriber with an EnvFilter built from the
//! configured level plus per-module overrides, and optional non-blocking
//! file output.

use anyhow::{Context, Result, anyhow};
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::infrastructure::config::LoggingSettings;

// Keeps the non-blocking file writers alive for the process lifetime.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Initialize the global tracing subscriber from the logging settings.
pub fn init_logging(config: &LoggingSettings) -> Result<()> {
    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level '{}'", config.level))?;
    for (module, level) in &config.module_filters {
        let directive = format!("{module}={level}")
            .parse()
            .with_context(|| format!("Invalid log filter '{module}={level}'"))?;
        filter = filter.add_directive(directive);
    }

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    if config.file_output {
        std::fs::create_dir_all(&config.directory)
            .with_context(|| format!("Failed to create log directory '{}'", config.directory))?;
        let appender = tracing_appender::rolling::never(&config.directory, &config.file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }

        registry
            .with(fmt::layer().with_writer(writer).with_ansi(false))
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;
    } else {
        registry
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;
    }

    Ok(())
}
