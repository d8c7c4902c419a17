//! # Logging Utilities
//!
//! Logging setup for symbase binaries using `tracing`.
//!
//! Console output goes to stderr so it never mixes with command output on
//! stdout. Optionally every event is also written to a daily rolling file.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symbase_utils::init_logging;
//!
//! // Keep the guard alive until the program ends, it flushes the log file
//! let _guard = init_logging().expect("Failed to initialize logging");
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: filter directives (e.g., `RUST_LOG=debug`, `RUST_LOG=symbase_core=trace`)
//! - `SYMBASE_LOG_FORMAT`: `pretty` (default) or `json`
//! - `SYMBASE_LOG_FILE`: additionally write to this file (rotated daily)

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_VAR: &str = "SYMBASE_LOG_FORMAT";
/// Environment variable naming an additional log file.
pub const LOG_FILE_VAR: &str = "SYMBASE_LOG_FILE";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_owned())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_owned())),
        }
    }
}

/// Keeps the background writer of a log file alive
///
/// Dropping the guard flushes pending events. Without a log file it holds
/// nothing.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).with_filter(filter).boxed(),
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
    }
}

fn file_writer(path: &Path, rolling: bool) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard)
{
    let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path.file_name().unwrap_or_default();
    let appender = if rolling {
        tracing_appender::rolling::daily(directory, file_name)
    } else {
        tracing_appender::rolling::never(directory, file_name)
    };
    tracing_appender::non_blocking(appender)
}

fn filter_for(level: Option<Level>) -> EnvFilter
{
    match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::WARN.to_string())),
    }
}

fn install(layers: Vec<BoxedLayer>) -> Result<(), LoggingError>
{
    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))
}

/// Initialize logging from the environment
///
/// Reads `RUST_LOG` (default `warn`), `SYMBASE_LOG_FORMAT` and
/// `SYMBASE_LOG_FILE`.
///
/// ## Errors
///
/// - `InvalidFormat`: `SYMBASE_LOG_FORMAT` is neither `pretty` nor `json`
/// - `InitializationFailed`: a global subscriber is already installed
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    let format = match env::var(LOG_FORMAT_VAR) {
        Ok(value) => value.parse()?,
        Err(_) => LogFormat::Pretty,
    };
    init_with(format, None, env::var_os(LOG_FILE_VAR).map(PathBuf::from))
}

/// Initialize logging with an explicit level, ignoring `RUST_LOG`
///
/// `SYMBASE_LOG_FILE` is still honored.
///
/// ## Example
///
/// ```rust,no_run
/// use symbase_utils::{init_logging_with_level, LogFormat, LogLevel};
///
/// let _guard = init_logging_with_level(LogLevel::Debug, LogFormat::Pretty).unwrap();
/// ```
///
/// ## Errors
///
/// `InitializationFailed` if a global subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    init_with(format, Some(level.into()), env::var_os(LOG_FILE_VAR).map(PathBuf::from))
}

fn init_with(format: LogFormat, level: Option<Level>, log_file: Option<PathBuf>) -> Result<LoggingGuard, LoggingError>
{
    let mut layers = vec![format_layer(format, io::stderr, true, filter_for(level))];
    let file_guard = log_file.map(|path| {
        let (writer, guard) = file_writer(&path, true);
        layers.push(format_layer(format, writer, false, filter_for(level)));
        guard
    });
    install(layers)?;
    Ok(LoggingGuard { _file: file_guard })
}

/// Log to `log_file` only, nothing on the console
///
/// The file is not rotated. Without `level`, `RUST_LOG` decides.
///
/// ## Errors
///
/// - `FileError`: the directory of `log_file` cannot be created
/// - `InitializationFailed`: a global subscriber is already installed
pub fn init_logging_file_only(log_file: &Path, format: LogFormat, level: Option<LogLevel>)
    -> Result<LoggingGuard, LoggingError>
{
    if let Some(directory) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(directory)?;
    }
    let (writer, file_guard) = file_writer(log_file, false);
    install(vec![format_layer(format, writer, false, filter_for(level.map(Into::into)))])?;
    Ok(LoggingGuard { _file: Some(file_guard) })
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Invalid log format: {0} (use 'pretty' or 'json')")]
    InvalidFormat(String),

    #[error("Invalid log level: {0} (use 'error', 'warn', 'info', 'debug' or 'trace')")]
    InvalidLevel(String),

    /// A global subscriber was installed before
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert!(matches!(LogFormat::from_str("xml"), Err(LoggingError::InvalidFormat(_))));
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(matches!(LogLevel::from_str("loud"), Err(LoggingError::InvalidLevel(_))));
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
    }

    #[test]
    fn test_second_initialization_fails()
    {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("logs").join("symbase.log");
        let first = init_logging_file_only(&log_file, LogFormat::Json, Some(LogLevel::Info));
        assert!(first.is_ok());
        assert!(dir.path().join("logs").is_dir());
        let second = init_logging_file_only(&log_file, LogFormat::Pretty, None);
        assert!(matches!(second, Err(LoggingError::InitializationFailed(_))));
    }
}
