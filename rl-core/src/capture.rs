//! Fingerprint acquisition
//!
//! Repeats native capture attempts against a deadline. Codes -8 and -10 mean
//! "no finger yet" and are retried; anything else aborts. The deadline is only
//! checked between attempts.

use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::constants::{capture, codes, sensor};
use crate::device::DeviceSession;
use crate::driver::codes::{is_transient_capture, message_for};
use crate::error::{Result, RidgelineError};
use crate::template::Template;

/// A successful capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedTemplate {
    pub template: Template,
    pub len: usize,
}

/// Capture one template from the opened scanner
pub fn capture_template(session: &DeviceSession, timeout: Duration) -> Result<CapturedTemplate> {
    let handle = session.handle().ok_or(RidgelineError::DeviceNotOpen)?;
    if !session.capabilities().acquire {
        return Err(RidgelineError::UnsupportedDriver(
            "ZKFPM_AcquireFingerprint is not exported".to_string(),
        ));
    }

    let mut image = vec![0u8; session.image_capacity()];
    let mut template = vec![0u8; sensor::TEMPLATE_CAPACITY];
    let started = Instant::now();
    let mut last_transient: Option<i32> = None;
    let mut attempts = 0u32;

    while started.elapsed() < timeout {
        attempts += 1;
        match session
            .driver()
            .acquire_fingerprint(handle, &mut image, &mut template)
        {
            Ok(len) if len > 0 => {
                let len = len.min(template.len());
                template.truncate(len);
                info!(len, attempts, "Fingerprint captured");
                return Ok(CapturedTemplate {
                    template: Template::new(template),
                    len,
                });
            }
            Ok(_) => {
                trace!("Capture returned an empty template, retrying");
            }
            Err(code) if is_transient_capture(code) => {
                trace!(code, "No finger on sensor yet");
                last_transient = Some(code);
            }
            Err(code) => {
                let message = message_for(code);
                warn!(code, %message, "Capture failed");
                return Err(RidgelineError::CaptureHardError { code, message });
            }
        }
        thread::sleep(capture::RETRY_BACKOFF);
    }

    let code = last_transient.unwrap_or(codes::CAPTURE_TIMEOUT);
    debug!(code, attempts, "Capture deadline reached");
    Err(RidgelineError::CaptureTimeout {
        code,
        message: message_for(code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::session::tests::{full_capabilities, mock_driver};
    use crate::driver::{Capabilities, DeviceHandle, MockScannerDriver};

    fn opened_session(mut mock: MockScannerDriver) -> DeviceSession {
        mock.expect_init().returning(|| 0);
        mock.expect_open_device()
            .returning(|_| DeviceHandle::from_raw(0x3000));
        mock.expect_get_int_parameter()
            .returning(|_, _| Ok(10));
        mock.expect_db_init().returning(|_| Ok(0));
        let mut session = DeviceSession::new(Box::new(mock));
        session.open(0).unwrap();
        session
    }

    #[test]
    fn test_transient_codes_are_retried() {
        let mut mock = mock_driver(full_capabilities());
        let mut calls = 0;
        mock.expect_acquire_fingerprint().times(3).returning(
            move |_, image: &mut [u8], template: &mut [u8]| {
                assert_eq!(image.len(), 100);
                calls += 1;
                match calls {
                    1 => Err(-8),
                    2 => Err(-10),
                    _ => {
                        template[..4].copy_from_slice(&[9, 8, 7, 6]);
                        Ok(4)
                    }
                }
            },
        );

        let session = opened_session(mock);
        let captured = capture_template(&session, Duration::from_secs(5)).unwrap();
        assert_eq!(captured.len, 4);
        assert_eq!(captured.template.as_bytes(), &[9, 8, 7, 6]);
    }

    #[test]
    fn test_hard_error_fails_fast() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_acquire_fingerprint()
            .times(1)
            .returning(|_, _: &mut [u8], _: &mut [u8]| Err(-4));

        let session = opened_session(mock);
        let started = Instant::now();
        let err = capture_template(&session, Duration::from_secs(5)).unwrap_err();

        assert!(started.elapsed() < capture::RETRY_BACKOFF);
        match err {
            RidgelineError::CaptureHardError { code, message } => {
                assert_eq!(code, -4);
                assert_eq!(message, "invalid parameter");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_timeout_reports_last_transient_code() {
        let mut mock = mock_driver(full_capabilities());
        mock.expect_acquire_fingerprint()
            .returning(|_, _: &mut [u8], _: &mut [u8]| Err(-8));

        let session = opened_session(mock);
        let err = capture_template(&session, Duration::from_millis(300)).unwrap_err();
        assert!(matches!(
            err,
            RidgelineError::CaptureTimeout { code: -8, .. }
        ));
    }

    #[test]
    fn test_requires_open_device() {
        let mock = mock_driver(full_capabilities());
        let session = DeviceSession::new(Box::new(mock));
        assert!(matches!(
            capture_template(&session, Duration::from_secs(1)),
            Err(RidgelineError::DeviceNotOpen)
        ));
    }

    #[test]
    fn test_requires_acquire_capability() {
        let caps = Capabilities {
            acquire: false,
            ..full_capabilities()
        };
        let mut mock = mock_driver(caps);
        mock.expect_acquire_fingerprint().never();

        let session = opened_session(mock);
        assert!(matches!(
            capture_template(&session, Duration::from_secs(1)),
            Err(RidgelineError::UnsupportedDriver(_))
        ));
    }
}
