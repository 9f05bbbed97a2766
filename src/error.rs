//! Custom error types for the application.
//!
//! This module defines the primary error type, `LoggerError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to report what can go
//! wrong between the serial port and the log file.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment` while loading the configuration file or
//!   environment overrides.
//! - **`Configuration`**: Semantic errors found by `LoggerConfig::validate`, such as an
//!   unknown log level or a read timeout that is not sub-second.
//! - **`Io`**: Wraps `std::io::Error` for file and console I/O.
//! - **`Transport`**: The serial port is missing, busy or not permitted. Fatal for the
//!   current session.
//! - **`SerialUnexpectedEof`**: The device side of the stream went away.
//! - **`StorageUnavailable`**: The log file cannot be created, opened or read as a table.
//!   Fatal for the current session.
//! - **`WriteFailed`**: A single row could not be persisted on an otherwise open log.
//!   The reading is lost, the session continues.
//! - **`Discovery`**: Serial port enumeration failed.
//!
//! Parse failures of device lines are not errors; they are `FrameOutcome` values handled
//! where they are detected. Undecodable bytes are dropped by the lossy decoder and never
//! reach this type.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, LoggerError>;

/// Everything that can go wrong between the serial port and the log file.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// Loading the configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// A loaded value is out of range.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// File or console I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port cannot be opened or used.
    #[error("Cannot use serial port '{port}': {reason}")]
    Transport {
        /// Port name
        port: String,
        /// Driver message
        reason: String,
    },

    /// The device stream ended.
    #[error("Unexpected EOF from serial port")]
    SerialUnexpectedEof,

    /// The log file cannot be created, opened or read as a table.
    #[error("Log file '{}' unavailable: {reason}", .path.display())]
    StorageUnavailable {
        /// Log file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// One row was not persisted.
    #[error("Failed to save row: {0}")]
    WriteFailed(String),

    /// Listing ports failed.
    #[error("Failed to enumerate serial ports: {0}")]
    Discovery(String),
}

impl From<figment::Error> for LoggerError {
    fn from(value: figment::Error) -> Self {
        LoggerError::Config(Box::new(value))
    }
}

impl LoggerError {
    /// Shorthand for a `Transport` error on `port`.
    pub fn transport(port: impl Into<String>, reason: impl ToString) -> Self {
        LoggerError::Transport {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a `StorageUnavailable` error on `path`.
    pub fn storage_unavailable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        LoggerError::StorageUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a capture session may keep running after this error.
    ///
    /// Only a lost row and a transient read error are recoverable; everything else
    /// ends the session with an operator-visible message.
    pub fn is_recoverable(&self) -> bool {
        match self {
            LoggerError::WriteFailed(_) | LoggerError::Io(_) => true,
            LoggerError::Config(_)
            | LoggerError::Configuration(_)
            | LoggerError::Transport { .. }
            | LoggerError::SerialUnexpectedEof
            | LoggerError::StorageUnavailable { .. }
            | LoggerError::Discovery(_) => false,
        }
    }
}
