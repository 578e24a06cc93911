//! Logging setup
//!
//! The library only emits `tracing` events. Applications embedding it can call
//! [`init_logging`] to get pretty output on a terminal and JSON otherwise.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse a level name, falling back to INFO for anything unrecognised
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize the logging/tracing system. `RUST_LOG` overrides `log_level`.
pub fn init_logging(log_level: &str) -> Result<()> {
    let level = parse_level(log_level);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dockhand={}", level)));

    if stdout_is_terminal() {
        let stdout_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .with_writer(std::io::stdout);

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .with_writer(std::io::stdout);

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}

fn stdout_is_terminal() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::isatty(libc::STDOUT_FILENO) != 0 }
    }
    #[cfg(not(unix))]
    {
        false
    }
}
