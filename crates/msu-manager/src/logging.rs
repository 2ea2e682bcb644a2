use std::io;
use std::path::Path;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LogLevel;

/// Installs the global subscriber: human-readable output on stderr and, when
/// `log_dir` is given, a daily-rolling JSON file. `RUST_LOG` overrides the
/// configured level. Keep the returned guard alive until exit.
pub fn init_tracing(
    level: LogLevel,
    log_dir: Option<&Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true);

    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    let Some(log_dir) = log_dir else {
        registry.init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "msu-manager.log");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(false)
        .json();
    registry.with(file_layer).init();

    Ok(Some(file_guard))
}
