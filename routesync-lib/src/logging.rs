use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "info";
pub const ENV_VAR_LOG_FILE: &str = "ROUTESYNC_LOG_FILE";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initializes the global `tracing` subscriber with a file logging layer.
///
/// Opens (or creates) the log file at `log_path` in append mode and writes
/// structured logs to it with ANSI colors disabled. Verbosity is read from
/// `RUST_LOG` and defaults to `"info"`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_log_file(log_path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_path)?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(BoxMakeWriter::new(file)).with_ansi(false))
        .with(env_filter())
        .init();
    tracing::debug!("logging initialized with file output: {}", log_path.display());
    Ok(())
}

/// Initializes the global `tracing` subscriber with stdout logging.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn setup_stdout() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(true))
        .with(env_filter())
        .init();
    tracing::debug!("logging initialized with stdout/stderr output");
}
