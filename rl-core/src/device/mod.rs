//! Device management
//!
//! The `DeviceManager` is the single mutual-exclusion point for everything
//! that touches the scanner or the native matcher. It binds the driver on the
//! first request and keeps the resulting session until it is terminated. A
//! failed bind is remembered the same way, so requests made without a driver
//! do not search the library paths again until `terminate` resets the manager.

pub mod session;

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::driver::{NativeDriver, ScannerDriver};
use crate::error::{Result, RidgelineError};

pub use session::{DeviceSession, DeviceStatus, MatcherDbStatus, SensorGeometry, SessionState};

/// Produces a bound driver from an optional override path
pub type DriverLoader =
    Box<dyn Fn(Option<&Path>) -> Result<Box<dyn ScannerDriver>> + Send + Sync>;

pub struct DeviceManager {
    session: Mutex<Option<DeviceSession>>,
    /// Report from the last failed bind; only touched with `session` locked
    bind_failure: Mutex<Option<String>>,
    loader: DriverLoader,
    driver_path: Option<PathBuf>,
    device_index: i32,
}

impl DeviceManager {
    /// Manager backed by the vendor library
    pub fn new(driver_path: Option<PathBuf>, device_index: i32) -> Self {
        Self::with_loader(
            driver_path,
            device_index,
            Box::new(|path: Option<&Path>| {
                NativeDriver::bind(path).map(|d| Box::new(d) as Box<dyn ScannerDriver>)
            }),
        )
    }

    pub fn with_loader(driver_path: Option<PathBuf>, device_index: i32, loader: DriverLoader) -> Self {
        Self {
            session: Mutex::new(None),
            bind_failure: Mutex::new(None),
            loader,
            driver_path,
            device_index,
        }
    }

    pub fn device_index(&self) -> i32 {
        self.device_index
    }

    /// Run `f` against the session under the device lock, binding the driver
    /// first if no session exists yet.
    pub fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut DeviceSession) -> Result<T>,
    {
        let mut guard = self.session.lock();
        let session = match guard.take() {
            Some(session) => session,
            None => {
                let mut failure = self.bind_failure.lock();
                if let Some(report) = failure.as_ref() {
                    return Err(RidgelineError::DriverUnavailable {
                        report: report.clone(),
                    });
                }
                let driver = match (self.loader)(self.driver_path.as_deref()) {
                    Ok(driver) => driver,
                    Err(RidgelineError::DriverUnavailable { report }) => {
                        debug!("Driver bind failed, caching report until terminate");
                        *failure = Some(report.clone());
                        return Err(RidgelineError::DriverUnavailable { report });
                    }
                    Err(e) => return Err(e),
                };
                debug!(path = ?driver.library_path(), "Device session created");
                DeviceSession::new(driver)
            }
        };

        f(guard.insert(session))
    }

    /// Run `f` only if a session already exists; never binds a driver
    pub fn with_existing<T, F>(&self, f: F) -> Option<T>
    where
        F: FnOnce(&mut DeviceSession) -> T,
    {
        self.session.lock().as_mut().map(f)
    }

    /// Open the configured scanner, initializing the driver as needed
    pub fn open(&self) -> Result<DeviceStatus> {
        let index = self.device_index;
        self.with_session(|session| session.ensure_open(index))
    }

    /// Release the scanner handle. No-op without a session.
    pub fn close(&self) -> bool {
        self.with_existing(|session| session.close()).unwrap_or(false)
    }

    /// Tear the session down completely and forget any bind failure; the
    /// next request binds again
    pub fn terminate(&self) {
        let mut guard = self.session.lock();
        self.bind_failure.lock().take();
        if let Some(mut session) = guard.take() {
            session.terminate();
            info!("Device session terminated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::session::tests::{full_capabilities, mock_driver};
    use super::*;
    use crate::driver::DeviceHandle;
    use crate::error::RidgelineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_loader(binds: Arc<AtomicUsize>) -> DriverLoader {
        Box::new(move |_| {
            binds.fetch_add(1, Ordering::SeqCst);
            let mut mock = mock_driver(full_capabilities());
            mock.expect_init().returning(|| 0);
            mock.expect_device_count().returning(|| 1);
            mock.expect_open_device()
                .returning(|_| DeviceHandle::from_raw(0x2000));
            mock.expect_get_int_parameter().returning(|_, _| Err(-7));
            mock.expect_db_init().returning(|_| Ok(0));
            Ok(Box::new(mock))
        })
    }

    #[test]
    fn test_binds_lazily_once() {
        let binds = Arc::new(AtomicUsize::new(0));
        let manager = DeviceManager::with_loader(None, 0, counting_loader(binds.clone()));
        assert_eq!(binds.load(Ordering::SeqCst), 0);

        assert!(!manager.open().unwrap().already_open);
        assert!(manager.open().unwrap().already_open);
        assert_eq!(binds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_terminate_forces_rebind() {
        let binds = Arc::new(AtomicUsize::new(0));
        let manager = DeviceManager::with_loader(None, 0, counting_loader(binds.clone()));

        manager.open().unwrap();
        manager.terminate();
        assert!(manager.with_existing(|_| ()).is_none());

        manager.open().unwrap();
        assert_eq!(binds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_without_session_is_noop() {
        let binds = Arc::new(AtomicUsize::new(0));
        let manager = DeviceManager::with_loader(None, 0, counting_loader(binds.clone()));
        assert!(!manager.close());
        assert_eq!(binds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bind_failure_propagates() {
        let manager = DeviceManager::with_loader(
            None,
            0,
            Box::new(|_| {
                Err(RidgelineError::DriverUnavailable {
                    report: "  - /nowhere/libzkfp.so (not found)".to_string(),
                })
            }),
        );
        assert!(matches!(
            manager.open(),
            Err(RidgelineError::DriverUnavailable { .. })
        ));
        assert!(manager.with_existing(|_| ()).is_none());
    }

    #[test]
    fn test_bind_failure_cached_until_terminate() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let manager = DeviceManager::with_loader(
            None,
            0,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RidgelineError::DriverUnavailable {
                    report: "  - /nowhere/libzkfp.so (not found)".to_string(),
                })
            }),
        );

        for _ in 0..3 {
            match manager.with_session(|_| Ok(())) {
                Err(RidgelineError::DriverUnavailable { report }) => {
                    assert!(report.contains("/nowhere/libzkfp.so"))
                }
                other => panic!("expected DriverUnavailable, got {:?}", other),
            }
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        manager.terminate();
        assert!(manager.open().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_other_bind_errors_not_cached() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let manager = DeviceManager::with_loader(
            None,
            0,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RidgelineError::UnsupportedDriver("missing ZKFPM_AcquireFingerprint".to_string()))
            }),
        );

        assert!(manager.open().is_err());
        assert!(manager.open().is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
