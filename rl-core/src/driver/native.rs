//! ZKFinger SDK binding
//!
//! Resolves `libzkfp` from a prioritized candidate list, verifies the minimal
//! symbol set and probes the optional entry points once. The function
//! pointers are copied out of the library at bind time; the `Library` is kept
//! alive alongside them for as long as the driver exists.

use libloading::Library;
use std::ffi::{c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Capabilities, DbInitForm, DeviceHandle, DriverCallError, ScannerDriver};
use crate::constants::{codes, driver};
use crate::error::{Result, RidgelineError};

type InitFn = unsafe extern "system" fn() -> c_int;
type TerminateFn = unsafe extern "system" fn() -> c_int;
type DeviceCountFn = unsafe extern "system" fn() -> c_int;
type OpenDeviceFn = unsafe extern "system" fn(c_int) -> *mut c_void;
type CloseDeviceFn = unsafe extern "system" fn(*mut c_void) -> c_int;
type GetParametersFn = unsafe extern "system" fn(*mut c_void, c_int, *mut u8, *mut c_uint) -> c_int;
type AcquireFn =
    unsafe extern "system" fn(*mut c_void, *mut u8, c_uint, *mut u8, *mut c_uint) -> c_int;
type DbInitSizedFn = unsafe extern "system" fn(c_int) -> c_int;
type DbInitBareFn = unsafe extern "system" fn() -> c_int;
type DbFreeFn = unsafe extern "system" fn() -> c_int;
type DbMatchFn = unsafe extern "system" fn(*const u8, c_int, *const u8, c_int) -> c_int;
type MergeFn = unsafe extern "system" fn(
    *const u8,
    c_int,
    *const u8,
    c_int,
    *const u8,
    c_int,
    *mut u8,
    *mut c_uint,
) -> c_int;

/// Candidate library locations in search order: override, installed, local
pub fn candidate_paths(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = override_path {
        candidates.push(path.to_path_buf());
    }
    candidates.extend(driver::KNOWN_PATHS.iter().map(PathBuf::from));
    candidates.extend(driver::LOCAL_PATHS.iter().map(PathBuf::from));
    candidates
}

/// Driver backed by the vendor shared library
pub struct NativeDriver {
    path: PathBuf,
    init: InitFn,
    device_count: DeviceCountFn,
    open_device: OpenDeviceFn,
    terminate: Option<TerminateFn>,
    close_device: Option<CloseDeviceFn>,
    get_parameters: Option<GetParametersFn>,
    acquire: Option<AcquireFn>,
    db_init_sized: Option<DbInitSizedFn>,
    db_init_bare: Option<DbInitBareFn>,
    db_free: Option<DbFreeFn>,
    db_match: Option<DbMatchFn>,
    merge: Option<MergeFn>,
    capabilities: Capabilities,
    // Must outlive every pointer above; declared last so it drops last.
    _library: Library,
}

impl NativeDriver {
    /// Bind the first candidate that loads and exports the required symbols.
    ///
    /// On failure the error report lists every candidate with its reason.
    pub fn bind(override_path: Option<&Path>) -> Result<Self> {
        let mut tried = Vec::new();

        for path in candidate_paths(override_path) {
            if !path.exists() {
                tried.push(format!("{} (not found)", path.display()));
                continue;
            }

            debug!(path = %path.display(), "Trying fingerprint driver candidate");

            // SAFETY: loading a library runs its initializers. Candidates are
            // the configured override and fixed vendor install locations.
            let library = match unsafe { Library::new(&path) } {
                Ok(lib) => lib,
                Err(e) => {
                    tried.push(format!("{} ({})", path.display(), e));
                    continue;
                }
            };

            let missing: Vec<&str> = driver::REQUIRED_SYMBOLS
                .iter()
                .copied()
                .filter(|name| !has_symbol(&library, name))
                .collect();
            if !missing.is_empty() {
                tried.push(format!("{} (missing {})", path.display(), missing.join(", ")));
                continue;
            }

            match Self::from_library(path.clone(), library) {
                Ok(driver) => {
                    info!(
                        path = %path.display(),
                        pointer_bits = usize::BITS,
                        capabilities = ?driver.capabilities,
                        "Fingerprint driver bound"
                    );
                    return Ok(driver);
                }
                Err(reason) => tried.push(format!("{} ({})", path.display(), reason)),
            }
        }

        let report = tried
            .iter()
            .map(|line| format!("  - {}", line))
            .collect::<Vec<_>>()
            .join("\n");
        warn!("No usable fingerprint driver found");
        Err(RidgelineError::DriverUnavailable { report })
    }

    fn from_library(path: PathBuf, library: Library) -> std::result::Result<Self, String> {
        // SAFETY: the symbol types mirror the ZKFinger SDK headers. Pointers
        // copied out here stay valid because `library` is stored in `Self`.
        unsafe {
            let init = *library
                .get::<InitFn>(b"ZKFPM_Init\0")
                .map_err(|e| e.to_string())?;
            let device_count = *library
                .get::<DeviceCountFn>(b"ZKFPM_GetDeviceCount\0")
                .map_err(|e| e.to_string())?;
            let open_device = *library
                .get::<OpenDeviceFn>(b"ZKFPM_OpenDevice\0")
                .map_err(|e| e.to_string())?;

            let terminate = optional::<TerminateFn>(&library, b"ZKFPM_Terminate\0");
            let close_device = optional::<CloseDeviceFn>(&library, b"ZKFPM_CloseDevice\0");
            let get_parameters = optional::<GetParametersFn>(&library, b"ZKFPM_GetParameters\0");
            let acquire = optional::<AcquireFn>(&library, b"ZKFPM_AcquireFingerprint\0");
            let db_init_sized = optional::<DbInitSizedFn>(&library, b"ZKFPM_DBInit\0");
            let db_init_bare = optional::<DbInitBareFn>(&library, b"ZKFPM_DBInit\0");
            let db_free = optional::<DbFreeFn>(&library, b"ZKFPM_DBFree\0");
            let db_match = optional::<DbMatchFn>(&library, b"ZKFPM_DBMatch\0");
            let merge = optional::<MergeFn>(&library, b"ZKFPM_MergeTemplates\0");

            let capabilities = Capabilities {
                acquire: acquire.is_some(),
                parameters: get_parameters.is_some(),
                db_init: db_init_sized.is_some(),
                db_free: db_free.is_some(),
                db_match: db_match.is_some(),
                merge: merge.is_some(),
            };

            Ok(Self {
                path,
                init,
                device_count,
                open_device,
                terminate,
                close_device,
                get_parameters,
                acquire,
                db_init_sized,
                db_init_bare,
                db_free,
                db_match,
                merge,
                capabilities,
                _library: library,
            })
        }
    }
}

fn has_symbol(library: &Library, name: &str) -> bool {
    // SAFETY: only the symbol's presence is checked; the pointer is not used.
    unsafe { library.get::<*const c_void>(name.as_bytes()).is_ok() }
}

/// Copy an optional entry point out of the library
///
/// # Safety
/// `T` must match the native signature of `name`.
unsafe fn optional<T: Copy>(library: &Library, name: &[u8]) -> Option<T> {
    library.get::<T>(name).ok().map(|symbol| *symbol)
}

fn len_arg(bytes: &[u8]) -> std::result::Result<c_int, DriverCallError> {
    c_int::try_from(bytes.len())
        .map_err(|_| DriverCallError::Failed(format!("buffer of {} bytes too large", bytes.len())))
}

impl ScannerDriver for NativeDriver {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn library_path(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }

    fn init(&self) -> i32 {
        // SAFETY: argument-less SDK call
        unsafe { (self.init)() }
    }

    fn terminate(&self) {
        if let Some(terminate) = self.terminate {
            // SAFETY: argument-less SDK call
            unsafe {
                terminate();
            }
        }
    }

    fn device_count(&self) -> i32 {
        // SAFETY: argument-less SDK call
        unsafe { (self.device_count)() }
    }

    fn open_device(&self, index: i32) -> Option<DeviceHandle> {
        // SAFETY: the SDK returns null for an invalid index
        let raw = unsafe { (self.open_device)(index) };
        DeviceHandle::from_ptr(raw)
    }

    fn close_device(&self, handle: DeviceHandle) {
        if let Some(close) = self.close_device {
            // SAFETY: handle came from open_device and is closed exactly once
            // by the owning session
            unsafe {
                close(handle.as_ptr());
            }
        }
    }

    fn get_int_parameter(&self, handle: DeviceHandle, code: i32) -> std::result::Result<i32, i32> {
        let Some(get_parameters) = self.get_parameters else {
            return Err(codes::NOT_SUPPORTED);
        };

        let mut value: c_int = 0;
        let mut size = std::mem::size_of::<c_int>() as c_uint;
        // SAFETY: value/size point to live stack storage of the advertised size
        let rc = unsafe {
            get_parameters(
                handle.as_ptr(),
                code,
                (&mut value as *mut c_int).cast::<u8>(),
                &mut size,
            )
        };

        if rc == codes::OK {
            Ok(value)
        } else {
            Err(rc)
        }
    }

    fn acquire_fingerprint(
        &self,
        handle: DeviceHandle,
        image: &mut [u8],
        template: &mut [u8],
    ) -> std::result::Result<usize, i32> {
        let Some(acquire) = self.acquire else {
            return Err(codes::NOT_SUPPORTED);
        };

        let image_len = c_uint::try_from(image.len()).map_err(|_| codes::INVALID_PARAMETER)?;
        let mut template_len =
            c_uint::try_from(template.len()).map_err(|_| codes::INVALID_PARAMETER)?;

        // SAFETY: both buffers are exclusively borrowed for the call and their
        // capacities are passed alongside them
        let rc = unsafe {
            acquire(
                handle.as_ptr(),
                image.as_mut_ptr(),
                image_len,
                template.as_mut_ptr(),
                &mut template_len,
            )
        };

        if rc == codes::OK {
            Ok((template_len as usize).min(template.len()))
        } else {
            Err(rc)
        }
    }

    fn db_init(&self, form: DbInitForm) -> std::result::Result<i32, DriverCallError> {
        match form {
            DbInitForm::Sized(capacity) => {
                let init = self.db_init_sized.ok_or(DriverCallError::Missing("ZKFPM_DBInit"))?;
                let capacity = c_int::try_from(capacity)
                    .map_err(|_| DriverCallError::Failed("capacity out of range".into()))?;
                // SAFETY: an extra integer argument is ignored by SDK builds
                // whose DBInit takes none
                Ok(unsafe { init(capacity) })
            }
            DbInitForm::Bare => {
                let init = self.db_init_bare.ok_or(DriverCallError::Missing("ZKFPM_DBInit"))?;
                // SAFETY: argument-less SDK call
                Ok(unsafe { init() })
            }
        }
    }

    fn db_free(&self) -> std::result::Result<(), DriverCallError> {
        let free = self.db_free.ok_or(DriverCallError::Missing("ZKFPM_DBFree"))?;
        // SAFETY: argument-less SDK call
        unsafe {
            free();
        }
        Ok(())
    }

    fn db_match(&self, first: &[u8], second: &[u8]) -> std::result::Result<i32, DriverCallError> {
        let db_match = self.db_match.ok_or(DriverCallError::Missing("ZKFPM_DBMatch"))?;
        let first_len = len_arg(first)?;
        let second_len = len_arg(second)?;
        // SAFETY: the SDK only reads `len` bytes from each template
        Ok(unsafe { db_match(first.as_ptr(), first_len, second.as_ptr(), second_len) })
    }

    fn merge_templates(
        &self,
        first: &[u8],
        second: &[u8],
        third: &[u8],
        out: &mut [u8],
    ) -> std::result::Result<(i32, usize), DriverCallError> {
        let merge = self.merge.ok_or(DriverCallError::Missing("ZKFPM_MergeTemplates"))?;
        let mut out_len = c_uint::try_from(out.len())
            .map_err(|_| DriverCallError::Failed("output buffer too large".into()))?;

        // SAFETY: inputs are read-only for their stated lengths; the output
        // buffer capacity is passed in `out_len`
        let rc = unsafe {
            merge(
                first.as_ptr(),
                len_arg(first)?,
                second.as_ptr(),
                len_arg(second)?,
                third.as_ptr(),
                len_arg(third)?,
                out.as_mut_ptr(),
                &mut out_len,
            )
        };

        Ok((rc, (out_len as usize).min(out.len())))
    }
}
