//! Logging initialization.
//!
//! Console logging through `tracing-subscriber` with an env-filter
//! (`RUST_LOG` wins over the verbosity flag), plus an optional daily
//! rolling file appender for long sessions.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize console logging.
pub fn init(verbose: bool) {
    let default_filter = if verbose { "skycopilot=debug" } else { "skycopilot=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_timer(LocalTime::rfc_3339()))
        .init();
}

/// Initialize console plus daily-rolling file logging.
///
/// The returned guard must stay alive for the duration of the program or
/// buffered log lines are lost.
pub fn init_with_file(verbose: bool, log_dir: &Path) -> WorkerGuard {
    let default_filter = if verbose { "skycopilot=debug" } else { "skycopilot=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let appender = tracing_appender::rolling::daily(log_dir, "skycopilot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_timer(LocalTime::rfc_3339()))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    guard
}
