//! Scanner session lifecycle
//!
//! A `DeviceSession` owns the bound driver, the single opened scanner handle
//! and the native matcher database flag. It is only ever reached through the
//! `DeviceManager` lock, so none of its methods synchronize on their own.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::constants::{codes, sensor};
use crate::driver::codes::message_for;
use crate::driver::{
    Capabilities, DbInitForm, DeviceHandle, DriverCallError, InitOutcome, NativeScore,
    ScannerDriver,
};
use crate::error::{Result, RidgelineError};

// ============================================================================
// Session Types
// ============================================================================

/// Lifecycle state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Opened,
    Closed,
}

/// Sensor image geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorGeometry {
    pub width: u32,
    pub height: u32,
}

impl SensorGeometry {
    pub fn image_capacity(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            width: sensor::DEFAULT_WIDTH,
            height: sensor::DEFAULT_HEIGHT,
        }
    }
}

/// Readiness of the native matcher database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MatcherDbStatus {
    Ready,
    /// The driver does not export a DB init entry point
    Unsupported,
    Failed(String),
}

impl MatcherDbStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Outcome of opening the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    /// The session already held a handle; the driver was not touched
    pub already_open: bool,
    pub index: i32,
    pub geometry: SensorGeometry,
    pub image_capacity: usize,
    pub capabilities: Capabilities,
    pub matcher_db: MatcherDbStatus,
}

// ============================================================================
// Device Session
// ============================================================================

pub struct DeviceSession {
    driver: Box<dyn ScannerDriver>,
    capabilities: Capabilities,
    state: SessionState,
    handle: Option<DeviceHandle>,
    index: i32,
    geometry: Option<SensorGeometry>,
    db_ready: bool,
}

impl DeviceSession {
    pub fn new(driver: Box<dyn ScannerDriver>) -> Self {
        let capabilities = driver.capabilities();
        Self {
            driver,
            capabilities,
            state: SessionState::Uninitialized,
            handle: None,
            index: 0,
            geometry: None,
            db_ready: false,
        }
    }

    pub fn driver(&self) -> &dyn ScannerDriver {
        self.driver.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn handle(&self) -> Option<DeviceHandle> {
        self.handle
    }

    /// Geometry recorded at open; None before the first open
    pub fn geometry(&self) -> Option<SensorGeometry> {
        self.geometry
    }

    /// Image buffer size for capture
    pub fn image_capacity(&self) -> usize {
        self.geometry
            .map(|g| g.image_capacity())
            .unwrap_or(sensor::DEFAULT_IMAGE_CAPACITY)
    }

    pub fn matcher_db_ready(&self) -> bool {
        self.db_ready
    }

    /// Initialize the driver. Code 1 (already initialized) is success.
    pub fn initialize(&mut self) -> Result<InitOutcome> {
        let code = self.driver.init();
        let outcome = InitOutcome::from_code(code);

        if let InitOutcome::Failed(code) = outcome {
            warn!(code, "Fingerprint driver init failed");
            return Err(RidgelineError::DriverInit {
                code,
                message: message_for(code),
            });
        }

        debug!(?outcome, "Fingerprint driver initialized");
        if matches!(self.state, SessionState::Uninitialized) {
            self.state = SessionState::Initialized;
        }
        Ok(outcome)
    }

    /// Number of attached scanners; 0 is a valid answer
    pub fn device_count(&self) -> i32 {
        self.driver.device_count()
    }

    /// Open the scanner at `index`.
    ///
    /// Geometry falls back to 256x360 when the parameter query fails. The
    /// matcher database is initialized best-effort; a failure is logged and
    /// reported in the status, never returned as an error.
    pub fn open(&mut self, index: i32) -> Result<DeviceStatus> {
        if self.handle.is_some() {
            debug!(index = self.index, "Scanner already open");
            return Ok(self.status(true));
        }

        if matches!(self.state, SessionState::Uninitialized) {
            self.initialize()?;
        }

        let handle = self.driver.open_device(index).ok_or_else(|| {
            warn!(index, "Driver returned a null scanner handle");
            RidgelineError::DeviceOpen {
                index,
                code: codes::OPEN_FAILED,
            }
        })?;

        self.handle = Some(handle);
        self.index = index;
        self.state = SessionState::Opened;
        let geometry = self.query_geometry(handle);
        self.geometry = Some(geometry);

        let matcher_db = self.ensure_matcher_database(sensor::MATCHER_DB_CAPACITY);
        if !matcher_db.is_ready() {
            warn!(?matcher_db, "Native matcher database not available");
        }

        info!(
            index,
            width = geometry.width,
            height = geometry.height,
            "Scanner opened"
        );
        let mut status = self.status(false);
        status.matcher_db = matcher_db;
        Ok(status)
    }

    /// Initialize, check that a scanner is attached and open it, unless a
    /// handle is already held.
    pub fn ensure_open(&mut self, index: i32) -> Result<DeviceStatus> {
        if self.handle.is_some() {
            return Ok(self.status(true));
        }

        self.initialize()?;
        match self.device_count() {
            0 => Err(RidgelineError::NoDeviceAttached),
            count if count < 0 => Err(RidgelineError::DeviceOpen { index, code: count }),
            count => {
                debug!(count, "Scanners attached");
                self.open(index)
            }
        }
    }

    fn query_geometry(&self, handle: DeviceHandle) -> SensorGeometry {
        if !self.capabilities.parameters {
            return SensorGeometry::default();
        }

        let width = self.driver.get_int_parameter(handle, sensor::PARAM_WIDTH);
        let height = self.driver.get_int_parameter(handle, sensor::PARAM_HEIGHT);
        match (width, height) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => SensorGeometry {
                width: w as u32,
                height: h as u32,
            },
            (w, h) => {
                debug!(?w, ?h, "Sensor geometry query failed, using default");
                SensorGeometry::default()
            }
        }
    }

    fn status(&self, already_open: bool) -> DeviceStatus {
        let geometry = self.geometry.unwrap_or_default();
        DeviceStatus {
            already_open,
            index: self.index,
            geometry,
            image_capacity: geometry.image_capacity(),
            capabilities: self.capabilities,
            matcher_db: if self.db_ready {
                MatcherDbStatus::Ready
            } else if self.capabilities.db_init {
                MatcherDbStatus::Failed("not initialized".to_string())
            } else {
                MatcherDbStatus::Unsupported
            },
        }
    }

    /// Initialize the native matcher database once.
    ///
    /// The sized call form is tried first; drivers that reject it get the
    /// zero-argument form. Codes 0 and 1 both mean ready.
    pub fn ensure_matcher_database(&mut self, capacity: u32) -> MatcherDbStatus {
        if self.db_ready {
            return MatcherDbStatus::Ready;
        }
        if !self.capabilities.db_init {
            return MatcherDbStatus::Unsupported;
        }

        let result = match self.driver.db_init(DbInitForm::Sized(capacity)) {
            Err(DriverCallError::SignatureMismatch) => {
                debug!("Sized DBInit rejected, retrying without capacity");
                self.driver.db_init(DbInitForm::Bare)
            }
            other => other,
        };

        match result {
            Ok(code) if code == codes::OK || code == codes::ALREADY_INITIALIZED => {
                debug!(capacity, code, "Native matcher database ready");
                self.db_ready = true;
                MatcherDbStatus::Ready
            }
            Ok(code) => MatcherDbStatus::Failed(format!(
                "DBInit returned {} ({})",
                code,
                message_for(code)
            )),
            Err(DriverCallError::Missing(_)) => MatcherDbStatus::Unsupported,
            Err(e) => MatcherDbStatus::Failed(e.to_string()),
        }
    }

    /// One native comparison
    pub fn native_match(
        &self,
        first: &[u8],
        second: &[u8],
    ) -> std::result::Result<NativeScore, DriverCallError> {
        self.driver
            .db_match(first, second)
            .map(NativeScore::from_raw)
    }

    /// Native three-sample merge. Returns the driver code and the merged bytes.
    pub fn native_merge(
        &self,
        first: &[u8],
        second: &[u8],
        third: &[u8],
    ) -> std::result::Result<(i32, Vec<u8>), DriverCallError> {
        let mut out = vec![0u8; sensor::TEMPLATE_CAPACITY];
        let (code, len) = self.driver.merge_templates(first, second, third, &mut out)?;
        out.truncate(len);
        Ok((code, out))
    }

    /// Release the handle and the matcher database. Closing twice is a no-op.
    pub fn close(&mut self) -> bool {
        let had_handle = match self.handle.take() {
            Some(handle) => {
                self.driver.close_device(handle);
                info!(index = self.index, "Scanner closed");
                true
            }
            None => false,
        };

        if self.db_ready {
            if let Err(e) = self.driver.db_free() {
                debug!(error = %e, "DBFree failed");
            }
            self.db_ready = false;
        }

        if matches!(self.state, SessionState::Opened) {
            self.state = SessionState::Closed;
        }
        had_handle
    }

    /// Close and shut the driver down
    pub fn terminate(&mut self) {
        self.close();
        if !matches!(self.state, SessionState::Uninitialized) {
            self.driver.terminate();
            debug!("Fingerprint driver terminated");
        }
        self.state = SessionState::Uninitialized;
        self.geometry = None;
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if !matches!(self.state, SessionState::Uninitialized) || self.db_ready {
            self.terminate();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::driver::MockScannerDriver;

    pub(crate) fn full_capabilities() -> Capabilities {
        Capabilities {
            acquire: true,
            parameters: true,
            db_init: true,
            db_free: true,
            db_match: true,
            merge: true,
        }
    }

    /// Mock with the teardown calls every session makes on drop
    pub(crate) fn mock_driver(capabilities: Capabilities) -> MockScannerDriver {
        let mut mock = MockScannerDriver::new();
        mock.expect_capabilities().return_const(capabilities);
        mock.expect_library_path().returning(|| None);
        mock.expect_terminate().returning(|| ());
        mock.expect_close_device().returning(|_| ());
        mock.expect_db_free().returning(|| Ok(()));
        mock
    }

    fn handle() -> Option<DeviceHandle> {
        DeviceHandle::from_raw(0x1000)
    }

    #[test]
    fn test_init_already_initialized_is_success() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 1);

        let mut session = DeviceSession::new(Box::new(mock));
        assert_eq!(session.initialize().unwrap(), InitOutcome::AlreadyInitialized);
        assert_eq!(session.state(), SessionState::Initialized);
    }

    #[test]
    fn test_init_failure_maps_code() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| -6);

        let mut session = DeviceSession::new(Box::new(mock));
        match session.initialize() {
            Err(RidgelineError::DriverInit { code, message }) => {
                assert_eq!(code, -6);
                assert_eq!(message, "initialization failed");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_open_reads_geometry() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| handle());
        mock.expect_get_int_parameter()
            .returning(|_, code| if code == sensor::PARAM_WIDTH { Ok(300) } else { Ok(400) });
        mock.expect_db_init().returning(|_| Ok(0));

        let mut session = DeviceSession::new(Box::new(mock));
        let status = session.open(0).unwrap();
        assert!(!status.already_open);
        assert_eq!(status.geometry, SensorGeometry { width: 300, height: 400 });
        assert_eq!(session.image_capacity(), 120_000);
        assert_eq!(status.matcher_db, MatcherDbStatus::Ready);
    }

    #[test]
    fn test_geometry_falls_back_to_default() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| handle());
        mock.expect_get_int_parameter().returning(|_, _| Err(-7));
        mock.expect_db_init().returning(|_| Ok(0));

        let mut session = DeviceSession::new(Box::new(mock));
        let status = session.open(0).unwrap();
        assert_eq!(status.geometry, SensorGeometry { width: 256, height: 360 });
        assert_eq!(session.image_capacity(), 256 * 360);
    }

    #[test]
    fn test_second_open_does_not_touch_driver() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().times(1).returning(|| 0);
        mock.expect_open_device().times(1).returning(|_| handle());
        mock.expect_get_int_parameter().returning(|_, _| Err(-7));
        mock.expect_db_init().times(1).returning(|_| Ok(0));

        let mut session = DeviceSession::new(Box::new(mock));
        assert!(!session.open(0).unwrap().already_open);
        assert!(session.open(0).unwrap().already_open);
    }

    #[test]
    fn test_null_handle_is_open_error() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| None);

        let mut session = DeviceSession::new(Box::new(mock));
        assert!(matches!(
            session.open(2),
            Err(RidgelineError::DeviceOpen { index: 2, .. })
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn test_db_failure_does_not_fail_open() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| handle());
        mock.expect_get_int_parameter().returning(|_, _| Err(-7));
        mock.expect_db_init().returning(|_| Ok(-2));

        let mut session = DeviceSession::new(Box::new(mock));
        let status = session.open(0).unwrap();
        assert!(session.is_open());
        assert!(matches!(status.matcher_db, MatcherDbStatus::Failed(_)));
    }

    #[test]
    fn test_db_init_retries_bare_form() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_db_init().times(2).returning(|form| match form {
            DbInitForm::Sized(_) => Err(DriverCallError::SignatureMismatch),
            DbInitForm::Bare => Ok(1),
        });

        let mut session = DeviceSession::new(Box::new(mock));
        assert_eq!(session.ensure_matcher_database(2048), MatcherDbStatus::Ready);
        // Second call is served from the flag
        assert_eq!(session.ensure_matcher_database(2048), MatcherDbStatus::Ready);
    }

    #[test]
    fn test_db_unsupported_without_symbol() {
        let caps = Capabilities {
            db_init: false,
            ..full_capabilities()
        };
        let mock = mock_driver(caps);

        let mut session = DeviceSession::new(Box::new(mock));
        assert_eq!(session.ensure_matcher_database(2048), MatcherDbStatus::Unsupported);
    }

    #[test]
    fn test_close_twice_is_noop() {
        let mut mock = MockScannerDriver::new();
        mock.expect_capabilities().return_const(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| handle());
        mock.expect_get_int_parameter().returning(|_, _| Err(-7));
        mock.expect_db_init().returning(|_| Ok(0));
        mock.expect_close_device().times(1).returning(|_| ());
        mock.expect_db_free().times(1).returning(|| Ok(()));
        mock.expect_terminate().times(1).returning(|| ());

        let mut session = DeviceSession::new(Box::new(mock));
        session.open(0).unwrap();
        assert!(session.close());
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.matcher_db_ready());
    }

    #[test]
    fn test_terminate_resets_state() {
        let mut mock = MockScannerDriver::new();
        mock.expect_capabilities().return_const(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_open_device().returning(|_| handle());
        mock.expect_get_int_parameter().returning(|_, _| Err(-7));
        mock.expect_db_init().returning(|_| Ok(0));
        mock.expect_close_device().times(1).returning(|_| ());
        mock.expect_db_free().times(1).returning(|| Ok(()));
        mock.expect_terminate().times(1).returning(|| ());

        let mut session = DeviceSession::new(Box::new(mock));
        session.open(0).unwrap();
        session.terminate();
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(session.geometry().is_none());
        // Drop must not terminate a second time
        drop(session);
    }

    #[test]
    fn test_ensure_open_without_scanner() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_init().returning(|| 0);
        mock.expect_device_count().returning(|| 0);

        let mut session = DeviceSession::new(Box::new(mock));
        assert!(matches!(
            session.ensure_open(0),
            Err(RidgelineError::NoDeviceAttached)
        ));
    }
}
