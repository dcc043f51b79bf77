use std::sync::Once;

use config::shared::LogConfig;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_log::LogTracer;
use tracing_log::log::SetLoggerError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Directive used when `RUST_LOG` is not set.
const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// Tests only log when this variable is set, to keep the default test output readable.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to forward `log` records to tracing: {0}")]
    LogTracer(#[from] SetLoggerError),

    #[error("failed to open the log file appender: {0}")]
    Appender(#[from] InitError),

    #[error("failed to install the global subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Flushes buffered log lines to the log file when dropped.
///
/// Keep it alive until the process exits, otherwise the last lines are lost.
#[must_use]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
}

/// Installs the global subscriber of `app_name`.
///
/// Events go to stdout and to a daily rotated file in the directory named by `config`. The
/// file is written from a background thread.
pub fn init_tracing(app_name: &str, config: &LogConfig) -> Result<LogFlusher, TracingError> {
    LogTracer::init()?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.file_prefix)
        .build(&config.directory)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()?;

    tracing::info!(app = app_name, directory = %config.directory, "logging initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing to the test output, once per test binary.
///
/// Does nothing unless `ENABLE_TRACING` is set.
pub fn init_test_tracing() {
    if std::env::var_os(ENABLE_TRACING_ENV_NAME).is_none() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
