// Error types for the peak detection pipeline
//
// This module defines custom error types for acquisition, calibration, event
// logging and configuration, each carrying a stable numeric error code so that
// stage reports and telemetry can refer to failures without string matching.

mod acquisition;
mod calibration;
mod config;
mod event_log;

use std::fmt;

pub use acquisition::{log_acquisition_error, AcquisitionError, AcquisitionErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use config::{log_config_error, ConfigError, ConfigErrorCodes};
pub use event_log::{log_write_error, LogWriteError, LogWriteErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// pipeline stages.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Errors that prevent the engine from launching its stages
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Startup configuration rejected
    Config(ConfigError),
    /// Event log could not be opened under the fatal failure policy
    EventLog(LogWriteError),
    /// A stage thread panicked before reporting
    StagePanicked { stage: &'static str },
}

/// Engine error code constants
pub struct EngineErrorCodes {}

impl EngineErrorCodes {
    pub const STAGE_PANICKED: i32 = 5001;
}

impl ErrorCode for EngineError {
    fn code(&self) -> i32 {
        match self {
            EngineError::Config(err) => err.code(),
            EngineError::EventLog(err) => err.code(),
            EngineError::StagePanicked { .. } => EngineErrorCodes::STAGE_PANICKED,
        }
    }

    fn message(&self) -> String {
        match self {
            EngineError::Config(err) => err.message(),
            EngineError::EventLog(err) => err.message(),
            EngineError::StagePanicked { stage } => format!("{} thread panicked", stage),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Config(err) => write!(f, "{}", err),
            EngineError::EventLog(err) => write!(f, "{}", err),
            EngineError::StagePanicked { .. } => {
                write!(f, "EngineError[{}]: {}", self.code(), self.message())
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}

impl From<LogWriteError> for EngineError {
    fn from(err: LogWriteError) -> Self {
        EngineError::EventLog(err)
    }
}
