// src/logging.rs

//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--trace` / `--verbose` CLI flags (if provided)
//! 2. `TERRADAG_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `warn` so normal runs only show status lines

use anyhow::Result;
use tracing_subscriber::fmt;

/// Initialise the global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(verbose: bool, trace: bool) -> Result<()> {
    let level = if trace {
        tracing::Level::TRACE
    } else if verbose {
        tracing::Level::DEBUG
    } else {
        std::env::var("TERRADAG_LOG")
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::WARN)
    };

    // `init()` panics if called more than once; we only call once in main.
    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(tracing::Level::ERROR),
        "warn" | "warning" => Some(tracing::Level::WARN),
        "info" => Some(tracing::Level::INFO),
        "debug" => Some(tracing::Level::DEBUG),
        "trace" => Some(tracing::Level::TRACE),
        _ => None,
    }
}
