//! Biometric service
//!
//! Request-level operations over a template store, the device manager and the
//! match engine. Templates enter and leave as base64 text. Three outcomes stay
//! distinct for every decision: an operational `Err`, a result with
//! `matched == false`, and a result with `matched == true`.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::capture::{capture_template, CapturedTemplate};
use crate::config::EngineConfig;
use crate::constants::matching;
use crate::device::{DeviceManager, DeviceStatus, SensorGeometry, SessionState};
use crate::driver::Capabilities;
use crate::error::{Result, RidgelineError};
use crate::matching::{IdentifyResult, MatchEngine, MatchResult, MergeResult};
use crate::store::TemplateStore;
use crate::template::Template;

/// Outcome of a single-sample enrollment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollResult {
    pub subject_id: String,
    pub len: usize,
    /// A previous template was replaced
    pub replaced: bool,
}

/// Driver and matcher state for troubleshooting
#[derive(Debug, Clone, Serialize)]
pub struct DriverDiagnostics {
    pub driver_loaded: bool,
    pub library_path: Option<PathBuf>,
    pub pointer_bits: u32,
    pub capabilities: Option<Capabilities>,
    pub session_state: Option<SessionState>,
    pub device_open: bool,
    pub matcher_db_ready: bool,
    pub geometry: Option<SensorGeometry>,
    pub threshold: u32,
    pub force_fallback: bool,
    /// Bind failure report when the driver could not be loaded
    pub error: Option<String>,
}

pub struct BiometricService<S: TemplateStore> {
    store: S,
    devices: Arc<DeviceManager>,
    engine: MatchEngine,
    config: EngineConfig,
}

impl<S: TemplateStore> BiometricService<S> {
    /// Service backed by the vendor driver
    pub fn new(store: S, config: EngineConfig) -> Self {
        let devices = DeviceManager::new(config.driver_path.clone(), config.device_index);
        Self::with_devices(store, Arc::new(devices), config)
    }

    pub fn with_devices(store: S, devices: Arc<DeviceManager>, config: EngineConfig) -> Self {
        let engine = MatchEngine::new(devices.clone(), &config);
        Self {
            store,
            devices,
            engine,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Device
    // ------------------------------------------------------------------------

    pub fn open_device(&self) -> Result<DeviceStatus> {
        self.devices.open()
    }

    /// Returns true if a handle was released
    pub fn close_device(&self) -> bool {
        self.devices.close()
    }

    pub fn terminate_device(&self) {
        self.devices.terminate()
    }

    /// Capture one template, opening the scanner first if needed
    pub fn capture(&self, timeout: Option<Duration>) -> Result<CapturedTemplate> {
        let timeout = timeout.unwrap_or_else(|| self.config.capture_timeout());
        let index = self.devices.device_index();
        self.devices.with_session(|session| {
            session.ensure_open(index)?;
            capture_template(session, timeout)
        })
    }

    // ------------------------------------------------------------------------
    // Enrollment
    // ------------------------------------------------------------------------

    /// Store a template for a subject, replacing any previous one
    pub fn enroll(&self, subject_id: &str, template_b64: &str) -> Result<EnrollResult> {
        let template = Template::from_base64_non_empty(template_b64)?;
        let replaced = self.store.contains(subject_id)?;
        self.store.upsert(subject_id, &template)?;

        info!(subject = subject_id, len = template.len(), replaced, "Enrolled template");
        Ok(EnrollResult {
            subject_id: subject_id.to_string(),
            len: template.len(),
            replaced,
        })
    }

    /// Merge several samples and store the result.
    ///
    /// Empty strings are dropped before the sample count is checked.
    pub fn enroll_samples<T: AsRef<str>>(&self, subject_id: &str, samples_b64: &[T]) -> Result<MergeResult> {
        let present: Vec<&str> = samples_b64
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect();
        if present.len() < matching::MIN_MERGE_SAMPLES {
            return Err(RidgelineError::InsufficientSamples {
                required: matching::MIN_MERGE_SAMPLES,
                found: present.len(),
            });
        }

        let samples = present
            .into_iter()
            .map(Template::from_base64)
            .collect::<Result<Vec<_>>>()?;

        let result = self.engine.merge(&samples)?;
        self.store.upsert(subject_id, &result.template)?;

        info!(
            subject = subject_id,
            merged = result.merged,
            len = result.best_len,
            "Enrolled merged template"
        );
        Ok(result)
    }

    pub fn has_template(&self, subject_id: &str) -> Result<bool> {
        self.store.contains(subject_id)
    }

    // ------------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------------

    /// Compare a live template with the subject's enrolled one
    pub fn verify(&self, subject_id: &str, template_b64: &str) -> Result<MatchResult> {
        let live = Template::from_base64_non_empty(template_b64)?;
        let stored = self
            .store
            .get(subject_id)?
            .ok_or_else(|| RidgelineError::NotEnrolled(subject_id.to_string()))?;

        debug!(subject = subject_id, "Verifying");
        Ok(self.engine.verify(stored.as_bytes(), live.as_bytes()))
    }

    /// Search all enrolled templates for the best match
    pub fn identify(&self, template_b64: &str) -> Result<IdentifyResult> {
        let live = Template::from_base64_non_empty(template_b64)?;
        let candidates = self.store.get_all()?;
        Ok(self.engine.identify(live.as_bytes(), &candidates))
    }

    // ------------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------------

    pub fn diagnostics(&self) -> DriverDiagnostics {
        let mut report = DriverDiagnostics {
            driver_loaded: false,
            library_path: None,
            pointer_bits: usize::BITS,
            capabilities: None,
            session_state: None,
            device_open: false,
            matcher_db_ready: false,
            geometry: None,
            threshold: self.engine.threshold(),
            force_fallback: self.engine.force_fallback(),
            error: None,
        };

        let snapshot = self.devices.with_session(|session| {
            Ok((
                session.driver().library_path(),
                session.capabilities(),
                session.state(),
                session.is_open(),
                session.matcher_db_ready(),
                session.geometry(),
            ))
        });

        match snapshot {
            Ok((path, capabilities, state, open, db_ready, geometry)) => {
                report.driver_loaded = true;
                report.library_path = path;
                report.capabilities = Some(capabilities);
                report.session_state = Some(state);
                report.device_open = open;
                report.matcher_db_ready = db_ready;
                report.geometry = geometry;
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        report
    }
}
