//! Tracing setup for the CLI.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Whether `DEBUG_MODE` asks for debug output (`true` or `1`).
#[must_use]
pub fn debug_mode_enabled() -> bool {
    std::env::var("DEBUG_MODE")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

/// Filter directives used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        "info,og_installer=debug,og_cloud=debug"
    } else {
        "warn,og_installer=info,og_cloud=info"
    }
}

/// Install the global subscriber.
///
/// Logs go to stderr; with `log_file` they are also appended there without
/// colour codes.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let debug = verbose || debug_mode_enabled();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let file_layer = log_file
        .map(|path| {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Ok::<_, anyhow::Error>(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}
