//! # symbase Utilities
//!
//! Logging setup shared by the symbase binaries, built on `tracing`.

pub mod logging;

pub use logging::{
    init_logging, init_logging_file_only, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard,
};
pub use tracing::{debug, error, info, trace, warn};
