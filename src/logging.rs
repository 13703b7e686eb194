//! Logging initialization for threadslapper.
//!
//! Every record goes to stdout and is appended to `discordbot.log` inside the
//! configured log directory.

use std::fs::{self, OpenOptions};
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Configured level, or `INFO` when it is not a level name.
fn level_or_info(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}

fn filter_for(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level_or_info(level).into())
}

/// Install the global subscriber writing plain records to `writer`.
fn install<W>(writer: W, ansi: bool, level: &str)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(false),
        )
        .with(filter_for(level))
        .init();
}

/// Initialize logging to stdout and the log file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let dir = std::path::Path::new(&config.path);
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.file())?;

    // The file gets no color codes, so neither does stdout.
    install(std::io::stdout.and(Arc::new(log_file)), false, &config.level);
    Ok(())
}

/// Initialize console-only logging.
///
/// Used when the log file cannot be opened, so startup problems are still
/// reported.
pub fn init_console_only(level: &str) {
    install(std::io::stdout, true, level);
}
