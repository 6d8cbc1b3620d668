use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::ParseError, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::config::settings::LoggingSettings;

pub const LOG_FILE_PREFIX: &str = "dropdeck.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("logger already installed: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Send all `tracing` output to a daily rolling file in `directory`.
/// The terminal belongs to the UI, so nothing is written to stdout/stderr.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init(settings: &LoggingSettings, directory: &Path) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(directory)?;
    let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&settings.level, env.as_deref())?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true),
        )
        .try_init()?;

    Ok(guard)
}

/// `RUST_LOG` wins over the configured level unless it is blank or does not
/// parse.
fn build_filter(level: &str, env: Option<&str>) -> Result<EnvFilter, ParseError> {
    match env.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).or_else(|_| EnvFilter::try_new(level)),
        None => EnvFilter::try_new(level),
    }
}
