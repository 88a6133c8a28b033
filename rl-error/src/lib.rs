//! Unified error handling for Ridgeline
//!
//! A single error type shared by the engine, the template stores and the CLI.
//! Variants are grouped the same way callers need to react to them: driver and
//! device faults, capture faults, enrollment input faults and store faults.

use std::io;
use std::path::PathBuf;

/// Result type alias using RidgelineError
pub type Result<T> = std::result::Result<T, RidgelineError>;

/// Unified error type for all Ridgeline operations
#[derive(thiserror::Error, Debug)]
pub enum RidgelineError {
    // ============================================================================
    // Driver and Device Errors
    // ============================================================================
    /// No candidate library could be bound. The report lists every candidate
    /// and the reason it was rejected, one per line.
    #[error("Fingerprint driver unavailable. Candidates tried:\n{report}")]
    DriverUnavailable { report: String },

    #[error("Driver initialization failed with code {code}: {message}")]
    DriverInit { code: i32, message: String },

    #[error("Failed to open scanner at index {index} (code {code})")]
    DeviceOpen { index: i32, code: i32 },

    #[error("Scanner is not open")]
    DeviceNotOpen,

    #[error("No fingerprint scanner attached")]
    NoDeviceAttached,

    #[error("Driver does not support the requested operation: {0}")]
    UnsupportedDriver(String),

    // ============================================================================
    // Capture Errors
    // ============================================================================
    #[error("Capture timed out (code {code}: {message})")]
    CaptureTimeout { code: i32, message: String },

    #[error("Capture failed with code {code}: {message}")]
    CaptureHardError { code: i32, message: String },

    // ============================================================================
    // Enrollment and Input Errors
    // ============================================================================
    #[error("At least {required} fingerprint samples are required, got {found}")]
    InsufficientSamples { required: usize, found: usize },

    #[error("Invalid template encoding: {0}")]
    InvalidEncoding(String),

    #[error("Subject {0} has no enrolled fingerprint")]
    NotEnrolled(String),

    // ============================================================================
    // Template Store Errors
    // ============================================================================
    #[error("Template store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Subject {0} does not exist in the subject registry")]
    ForeignKeyViolation(String),

    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl RidgelineError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a store-unavailable error from a string
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create an invalid-encoding error from a string
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::InvalidEncoding(msg.into())
    }

    /// True when the failure means the scanner or the store could not be
    /// reached, as opposed to bad input or a valid negative answer.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::DriverUnavailable { .. }
                | Self::DriverInit { .. }
                | Self::DeviceOpen { .. }
                | Self::DeviceNotOpen
                | Self::NoDeviceAttached
                | Self::UnsupportedDriver(_)
                | Self::CaptureTimeout { .. }
                | Self::CaptureHardError { .. }
                | Self::StoreUnavailable(_)
                | Self::Io(_)
                | Self::FileRead { .. }
                | Self::FileWrite { .. }
        )
    }

    /// Native driver code carried by this error, if any
    pub fn driver_code(&self) -> Option<i32> {
        match self {
            Self::DriverInit { code, .. }
            | Self::DeviceOpen { code, .. }
            | Self::CaptureTimeout { code, .. }
            | Self::CaptureHardError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_unavailable_keeps_report() {
        let err = RidgelineError::DriverUnavailable {
            report: "  - /opt/a.so (not found)\n  - ./b.so (missing ZKFPM_Init)".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("/opt/a.so (not found)"));
        assert!(text.contains("./b.so (missing ZKFPM_Init)"));
    }

    #[test]
    fn test_operational_classification() {
        assert!(RidgelineError::store("db down").is_operational());
        assert!(RidgelineError::NoDeviceAttached.is_operational());
        assert!(!RidgelineError::NotEnrolled("u1".into()).is_operational());
        assert!(!RidgelineError::ForeignKeyViolation("u1".into()).is_operational());
        assert!(!RidgelineError::encoding("bad base64").is_operational());
    }

    #[test]
    fn test_driver_code() {
        let err = RidgelineError::CaptureHardError {
            code: -4,
            message: "invalid parameter".into(),
        };
        assert_eq!(err.driver_code(), Some(-4));
        assert_eq!(RidgelineError::DeviceNotOpen.driver_code(), None);
    }
}
