//! Constants and configuration values for Ridgeline
//!
//! Centralizes driver codes, buffer sizes, timings and configuration defaults.
//! Add new magic numbers here first and reference them from the modules.

use std::time::Duration;

/// Native driver library discovery
pub mod driver {
    /// Symbols every usable driver must export
    pub const REQUIRED_SYMBOLS: &[&str] = &[
        "ZKFPM_Init",
        "ZKFPM_OpenDevice",
        "ZKFPM_GetDeviceCount",
    ];

    /// Known installation paths, searched after the configured override
    #[cfg(windows)]
    pub const KNOWN_PATHS: &[&str] = &[
        r"C:\Program Files\ZKTeco\ZKFinger SDK\lib\libzkfp.dll",
        r"C:\Program Files (x86)\ZKTeco\ZKFinger SDK\lib\libzkfp.dll",
        r"C:\Windows\System32\libzkfp.dll",
        r"C:\Windows\SysWOW64\libzkfp.dll",
    ];

    #[cfg(not(windows))]
    pub const KNOWN_PATHS: &[&str] = &[
        "/usr/lib/libzkfp.so",
        "/usr/local/lib/libzkfp.so",
        "/usr/lib/x86_64-linux-gnu/libzkfp.so",
        "/opt/zkteco/lib/libzkfp.so",
    ];

    /// Local-directory fallbacks, searched last
    #[cfg(windows)]
    pub const LOCAL_PATHS: &[&str] = &["./zkfinger10.dll", "./ZKFPCap.dll"];

    #[cfg(not(windows))]
    pub const LOCAL_PATHS: &[&str] = &["./libzkfp.so", "./libzkfinger10.so"];
}

/// Native driver return codes
pub mod codes {
    pub const OK: i32 = 0;
    /// Returned by init and DB init when the SDK was already initialized
    pub const ALREADY_INITIALIZED: i32 = 1;
    pub const CANCELLED: i32 = -1;
    pub const SYSTEM_ERROR: i32 = -2;
    pub const NO_DEVICE: i32 = -3;
    pub const INVALID_PARAMETER: i32 = -4;
    pub const OPEN_FAILED: i32 = -5;
    pub const INIT_FAILED: i32 = -6;
    pub const NOT_SUPPORTED: i32 = -7;
    /// Not open, invalid handle or acquire timeout; transient during capture
    pub const NOT_READY: i32 = -8;
    pub const CAPTURE_TIMEOUT: i32 = -10;

    /// Codes the acquisition loop retries within its deadline
    pub const TRANSIENT_CAPTURE: &[i32] = &[NOT_READY, CAPTURE_TIMEOUT];
}

/// Sensor geometry and buffer sizes
pub mod sensor {
    /// GetParameters code for the image width
    pub const PARAM_WIDTH: i32 = 1;
    /// GetParameters code for the image height
    pub const PARAM_HEIGHT: i32 = 2;

    /// Fallback geometry used when the parameter query fails (ZK9500 sensor)
    pub const DEFAULT_WIDTH: u32 = 256;
    pub const DEFAULT_HEIGHT: u32 = 360;
    pub const DEFAULT_IMAGE_CAPACITY: usize = (DEFAULT_WIDTH * DEFAULT_HEIGHT) as usize;

    /// Fixed template buffer capacity for capture and native merge
    pub const TEMPLATE_CAPACITY: usize = 8192;

    /// Slot count requested from the native matcher database
    pub const MATCHER_DB_CAPACITY: u32 = 2048;
}

/// Capture loop timing
pub mod capture {
    use super::Duration;

    /// Backoff between attempts after a transient driver code
    pub const RETRY_BACKOFF: Duration = Duration::from_millis(120);

    /// Default overall capture deadline in milliseconds
    pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;
}

/// Matching and merging
pub mod matching {
    /// Default accept threshold on the 0-100 scale
    pub const DEFAULT_THRESHOLD: u32 = 45;

    /// Upper bound of the score scale
    pub const MAX_SCORE: u32 = 100;

    /// Native merge always consumes exactly this many samples
    pub const NATIVE_MERGE_SAMPLES: usize = 3;

    /// Multi-sample enrollment needs at least this many supplied samples
    pub const MIN_MERGE_SAMPLES: usize = 2;
}

/// Fallback similarity weights. These are calibrated values: changing them
/// changes accept/reject outcomes for enrolled users.
pub mod similarity {
    pub const HAMMING_WEIGHT: f64 = 0.6;
    pub const CORRELATION_WEIGHT: f64 = 0.3;
    pub const BIT_PATTERN_WEIGHT: f64 = 0.1;

    /// Templates whose length ratio exceeds this are treated as different fingers
    pub const MAX_LENGTH_RATIO: f64 = 1.5;

    /// Maximum penalty subtracted for a length mismatch
    pub const SIZE_PENALTY_SCALE: f64 = 50.0;
}

/// Configuration and storage paths
pub mod paths {
    /// Application directory name under the user config dir
    pub const APP_DIR: &str = "ridgeline";

    pub const CONFIG_FILE: &str = "config.json";

    pub const STORE_FILE: &str = "templates.json";

    /// Refuse to load template stores larger than this
    pub const MAX_STORE_SIZE: u64 = 64 * 1024 * 1024;

    /// Configuration directory for Ridgeline (XDG config dir, then ./ridgeline)
    pub fn config_dir() -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(APP_DIR)
    }
}

/// Environment variables read by the configuration loader
pub mod env {
    pub const MATCH_THRESHOLD: &str = "RIDGELINE_MATCH_THRESHOLD";
    pub const FORCE_FALLBACK: &str = "RIDGELINE_FORCE_FALLBACK";
    pub const DRIVER_PATH: &str = "RIDGELINE_DRIVER_PATH";
    pub const CAPTURE_TIMEOUT_MS: &str = "RIDGELINE_CAPTURE_TIMEOUT_MS";
    pub const STORE_PATH: &str = "RIDGELINE_STORE_PATH";
    /// Log filter consumed by the binary
    pub const LOG: &str = "RIDGELINE_LOG";
}
