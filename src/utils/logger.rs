use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between `debug` and
/// `info`. When `log_file` is given, output goes there instead of stderr so
/// the TUI's alternate screen stays clean.
pub fn init_logger(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(false)
                        .compact(),
                )
                .try_init()
                .context("Logger already initialized")?;
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_thread_names(false)
                        .compact(),
                )
                .try_init()
                .context("Logger already initialized")?;
        }
    }

    Ok(())
}

/// Log an info message with emoji prefix
pub fn log_info(emoji: &str, message: impl std::fmt::Display) {
    info!("{} {}", emoji, message);
}

/// Log a warning message with emoji prefix
pub fn log_warn(emoji: &str, message: impl std::fmt::Display) {
    warn!("{} {}", emoji, message);
}

/// Log an error message with emoji prefix
pub fn log_error(emoji: &str, message: impl std::fmt::Display) {
    error!("{} {}", emoji, message);
}

/// Log a debug message
pub fn log_debug(message: impl std::fmt::Display) {
    debug!("{}", message);
}
