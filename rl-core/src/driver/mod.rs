//! Scanner driver surface
//!
//! `ScannerDriver` is the capability-gated set of vendor entry points the
//! session needs. `NativeDriver` binds it to the ZKFinger shared library at
//! runtime; tests substitute a mock.
//!
//! Every method returns a tagged result. Presence of a symbol does not mean
//! the call will succeed, so callers handle failure per call.

pub mod codes;
pub mod native;

use serde::Serialize;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;

pub use codes::{InitOutcome, NativeScore};
pub use native::{candidate_paths, NativeDriver};

/// Optional entry points detected once when the driver is bound
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Capture with template extraction in one call
    pub acquire: bool,
    /// Sensor parameter query (width/height)
    pub parameters: bool,
    pub db_init: bool,
    pub db_free: bool,
    pub db_match: bool,
    pub merge: bool,
}

impl Capabilities {
    /// Native scoring needs both the matcher database and the match call
    pub fn native_match(&self) -> bool {
        self.db_init && self.db_match
    }
}

/// Opaque scanner handle. Never null; only the session holds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(NonZeroUsize);

impl DeviceHandle {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        Self::from_raw(ptr as usize)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.get() as *mut c_void
    }
}

/// Call form used for the matcher database init
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbInitForm {
    /// `DBInit(capacity)`
    Sized(u32),
    /// `DBInit()`
    Bare,
}

/// A native call that could not be made or did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCallError {
    /// The entry point is not exported by the bound library
    Missing(&'static str),
    /// The entry point rejected the call form (e.g. takes no size argument)
    SignatureMismatch,
    Failed(String),
}

impl fmt::Display for DriverCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(symbol) => write!(f, "driver does not export {}", symbol),
            Self::SignatureMismatch => write!(f, "driver rejected the call signature"),
            Self::Failed(msg) => write!(f, "driver call failed: {}", msg),
        }
    }
}

impl std::error::Error for DriverCallError {}

/// Vendor scanner entry points
#[cfg_attr(test, mockall::automock)]
pub trait ScannerDriver: Send {
    /// Capabilities detected at bind time
    fn capabilities(&self) -> Capabilities;

    /// Path of the bound library, if the driver came from disk
    fn library_path(&self) -> Option<PathBuf>;

    /// Raw init code (0 and 1 are success)
    fn init(&self) -> i32;

    fn terminate(&self);

    fn device_count(&self) -> i32;

    /// None when the driver returned a null handle
    fn open_device(&self, index: i32) -> Option<DeviceHandle>;

    fn close_device(&self, handle: DeviceHandle);

    /// Integer sensor parameter; Err carries the driver code
    fn get_int_parameter(&self, handle: DeviceHandle, code: i32) -> Result<i32, i32>;

    /// One capture attempt. Ok carries the template length written into
    /// `template`; Err carries the non-zero driver code.
    fn acquire_fingerprint(
        &self,
        handle: DeviceHandle,
        image: &mut [u8],
        template: &mut [u8],
    ) -> Result<usize, i32>;

    /// Raw DB init code for the requested call form
    fn db_init(&self, form: DbInitForm) -> Result<i32, DriverCallError>;

    fn db_free(&self) -> Result<(), DriverCallError>;

    /// Raw native score; negative values are driver faults
    fn db_match(&self, first: &[u8], second: &[u8]) -> Result<i32, DriverCallError>;

    /// Native three-sample merge. Ok carries the return code and the number
    /// of bytes written into `out`.
    fn merge_templates(
        &self,
        first: &[u8],
        second: &[u8],
        third: &[u8],
        out: &mut [u8],
    ) -> Result<(i32, usize), DriverCallError>;
}
