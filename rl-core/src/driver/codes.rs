//! Driver return codes
//!
//! The vendor SDK overloads plain integers: init treats 1 as success, scoring
//! treats any negative value as a fault, capture mixes transient and fatal
//! codes. Each call site converts the raw integer into one of the tagged
//! outcomes below instead of comparing numbers inline.

use serde::Serialize;

use crate::constants::codes;

/// Human-readable message for a driver code
pub fn message_for(code: i32) -> String {
    match code {
        codes::OK => "ok".to_string(),
        codes::CANCELLED => "cancelled".to_string(),
        codes::SYSTEM_ERROR => "system error".to_string(),
        codes::NO_DEVICE => "no device".to_string(),
        codes::INVALID_PARAMETER => "invalid parameter".to_string(),
        codes::OPEN_FAILED => "could not open device".to_string(),
        codes::INIT_FAILED => "initialization failed".to_string(),
        codes::NOT_SUPPORTED => "not supported".to_string(),
        codes::NOT_READY => "not open, invalid handle or timeout".to_string(),
        codes::CAPTURE_TIMEOUT => "capture timeout".to_string(),
        other => format!("error {}", other),
    }
}

/// True for capture codes that are retried until the deadline
pub fn is_transient_capture(code: i32) -> bool {
    codes::TRANSIENT_CAPTURE.contains(&code)
}

/// Outcome of the driver-level init call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "code", rename_all = "snake_case")]
pub enum InitOutcome {
    Initialized,
    AlreadyInitialized,
    Failed(i32),
}

impl InitOutcome {
    pub fn from_code(code: i32) -> Self {
        match code {
            codes::OK => Self::Initialized,
            codes::ALREADY_INITIALIZED => Self::AlreadyInitialized,
            other => Self::Failed(other),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Outcome of one native template comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeScore {
    /// Non-negative similarity reported by the driver
    Score(u32),
    /// Negative return: the driver failed, this is not a "no match"
    Fault(i32),
}

impl NativeScore {
    pub fn from_raw(raw: i32) -> Self {
        if raw < 0 {
            Self::Fault(raw)
        } else {
            Self::Score(raw as u32)
        }
    }
}
