//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files written off the calling thread
//! - Build-type conditional log levels
//! - Console-only fallback when file logging fails
//! - Environment variable override via CUBIST_LOG or RUST_LOG

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use crate::error::CubistError;

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "CUBIST_LOG";

const LOG_FILE_PREFIX: &str = "cubist";

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is a terminal (affects output formatting)
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the process.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether log lines are also going to a file.
    pub fn writes_to_file(&self) -> bool {
        self._worker_guard.is_some()
    }
}

/// Initialize logging with the given configuration.
///
/// If file logging cannot be set up, falls back to console only. Calling this
/// twice leaves the first subscriber in place.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: {e}. Using console only.");
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with defaults.
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    let result = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {e}");
    }

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, CubistError> {
    let file_appender = file_appender(&config.log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
    let combined = stdout.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| CubistError::config(format!("Failed to install file logger: {e}")))?;

    Ok(guard)
}

/// Daily rotating appender writing `cubist.<date>.log` files into `dir`.
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender, CubistError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CubistError::config(format!("Failed to create log directory {}: {e}", dir.display()))
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| CubistError::config(format!("Failed to initialize file logging: {e}")))
}

/// Build the filter: custom > CUBIST_LOG > RUST_LOG > default.
pub fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Default log filter for the build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,cubist_core=trace"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,cubist_core=info"
    }
}

/// Default log directory.
pub fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cubist")
        .join("logs")
}
