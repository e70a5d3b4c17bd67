// Acquisition error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Acquisition error code constants
///
/// Error code range: 1001-1004
pub struct AcquisitionErrorCodes {}

impl AcquisitionErrorCodes {
    /// Sampler hardware or driver reported a failure
    pub const DEVICE_FAILURE: i32 = 1001;

    /// Sample source could not be opened or read
    pub const SOURCE_UNREADABLE: i32 = 1002;

    /// A replayed row could not be parsed into a sample
    pub const MALFORMED_SAMPLE: i32 = 1003;

    /// The sample stream was disconnected without a shutdown sentinel
    pub const STREAM_DISCONNECTED: i32 = 1004;
}

/// Log an acquisition error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_acquisition_error(err: &AcquisitionError, context: &str) {
    error!(
        "Acquisition error in {}: code={}, component=Sampler, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Acquisition-related errors
///
/// Every variant is fatal for a running pipeline: downstream stages cannot
/// proceed without data, so the error travels with the shutdown sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionError {
    /// Sampler failed to deliver a sample
    DeviceFailure { details: String },

    /// Source file missing or unreadable
    SourceUnreadable { path: String, reason: String },

    /// Row in a replay source is not a valid frame
    MalformedSample { line: u64, reason: String },

    /// Upstream queue closed without a sentinel
    StreamDisconnected,
}

impl ErrorCode for AcquisitionError {
    fn code(&self) -> i32 {
        match self {
            AcquisitionError::DeviceFailure { .. } => AcquisitionErrorCodes::DEVICE_FAILURE,
            AcquisitionError::SourceUnreadable { .. } => AcquisitionErrorCodes::SOURCE_UNREADABLE,
            AcquisitionError::MalformedSample { .. } => AcquisitionErrorCodes::MALFORMED_SAMPLE,
            AcquisitionError::StreamDisconnected => AcquisitionErrorCodes::STREAM_DISCONNECTED,
        }
    }

    fn message(&self) -> String {
        match self {
            AcquisitionError::DeviceFailure { details } => {
                format!("Sampler failed to deliver a sample: {}", details)
            }
            AcquisitionError::SourceUnreadable { path, reason } => {
                format!("Cannot read sample source {}: {}", path, reason)
            }
            AcquisitionError::MalformedSample { line, reason } => {
                format!("Malformed sample on line {}: {}", line, reason)
            }
            AcquisitionError::StreamDisconnected => {
                "Sample stream disconnected without shutdown sentinel".to_string()
            }
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AcquisitionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AcquisitionError {}

impl From<std::io::Error> for AcquisitionError {
    fn from(err: std::io::Error) -> Self {
        AcquisitionError::DeviceFailure {
            details: err.to_string(),
        }
    }
}
