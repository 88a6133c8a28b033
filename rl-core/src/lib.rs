//! Ridgeline Core Library
//!
//! Fingerprint acquisition, template merging and matching for a single
//! ZKTeco scanner.
//!
//! # Features
//!
//! - **Driver Binding**: Runtime discovery of the vendor SDK with capability probing
//! - **Device Session**: One scanner handle, native matcher database lifecycle
//! - **Acquisition**: Deadline-bound capture with transient-code retries
//! - **Merging**: Native three-sample merge or best-sample selection
//! - **Matching**: Verify and identify with a native matcher and a fallback scorer
//! - **Stores**: In-memory and JSON-file template stores with a subject registry
//!
//! # Module Structure
//!
//! - `driver/` - Vendor SDK surface and return codes
//! - `device/` - Device manager and session
//! - `matching/` - Match engine, merger, fallback similarity
//! - `store/` - Template stores
//!
//! # Example
//!
//! ```no_run
//! use rl_core::{load_config, BiometricService, MemoryTemplateStore};
//!
//! let config = load_config(None).unwrap();
//! let service = BiometricService::new(MemoryTemplateStore::new(), config);
//! let result = service.identify("AQIDBA==").unwrap();
//! println!("matched: {}", result.matched);
//! ```

// Grouped modules
pub mod device;
pub mod driver;
pub mod matching;
pub mod store;

// Standalone modules
pub mod biometrics;
pub mod capture;
pub mod config;
pub mod constants;
pub mod error;
pub mod template;

// Re-export error types
pub use error::{Result, RidgelineError};

// Re-export the service facade
pub use biometrics::{BiometricService, DriverDiagnostics, EnrollResult};

// Re-export configuration
pub use config::{get_config_path, load_config, load_config_file, EngineConfig};

// Re-export device types
pub use capture::{capture_template, CapturedTemplate};
pub use device::{
    DeviceManager, DeviceSession, DeviceStatus, DriverLoader, MatcherDbStatus, SensorGeometry,
    SessionState,
};
pub use driver::{Capabilities, InitOutcome, NativeDriver, NativeScore, ScannerDriver};

// Re-export matching types
pub use matching::{
    similarity, FallbackReason, IdentifyResult, MatchEngine, MatchResult, MergeResult,
    PairwiseScores, ScoringPath,
};

// Re-export stores
pub use store::{JsonTemplateStore, MemoryTemplateStore, TemplateStore};
pub use template::Template;
