// Event log write error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Event log error code constants
///
/// Error code range: 3001-3003
pub struct LogWriteErrorCodes {}

impl LogWriteErrorCodes {
    /// Log file could not be opened for appending
    pub const OPEN_FAILED: i32 = 3001;

    /// Writing an event line failed
    pub const WRITE_FAILED: i32 = 3002;

    /// Flushing buffered lines to disk failed
    pub const FLUSH_FAILED: i32 = 3003;
}

pub fn log_write_error(err: &LogWriteError, context: &str) {
    error!(
        "Event log error in {}: code={}, component=EventLogger, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Event logger failures
///
/// Whether these stop the pipeline depends on the configured
/// [`LogFailurePolicy`](crate::config::LogFailurePolicy).
#[derive(Debug, Clone, PartialEq)]
pub enum LogWriteError {
    OpenFailed { path: String, reason: String },
    WriteFailed { reason: String },
    FlushFailed { reason: String },
}

impl ErrorCode for LogWriteError {
    fn code(&self) -> i32 {
        match self {
            LogWriteError::OpenFailed { .. } => LogWriteErrorCodes::OPEN_FAILED,
            LogWriteError::WriteFailed { .. } => LogWriteErrorCodes::WRITE_FAILED,
            LogWriteError::FlushFailed { .. } => LogWriteErrorCodes::FLUSH_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            LogWriteError::OpenFailed { path, reason } => {
                format!("Failed to open event log {}: {}", path, reason)
            }
            LogWriteError::WriteFailed { reason } => {
                format!("Failed to write event: {}", reason)
            }
            LogWriteError::FlushFailed { reason } => {
                format!("Failed to flush event log: {}", reason)
            }
        }
    }
}

impl fmt::Display for LogWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogWriteError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for LogWriteError {}
