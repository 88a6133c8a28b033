//! Engine configuration
//!
//! Values are resolved in three layers: built-in defaults, an optional JSON
//! file in the config directory, then `RIDGELINE_*` environment overrides.
//! The result is validated once and treated as read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{capture, env, matching, paths};
use crate::error::{Result, RidgelineError};

/// Configuration consumed by the engine and the service facade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Accept threshold on the 0-100 scale, shared by native and fallback scoring
    pub match_threshold: u32,
    /// Skip the native matcher entirely and always use the fallback scorer
    pub force_fallback: bool,
    /// Driver library tried before the known installation paths
    pub driver_path: Option<PathBuf>,
    /// Overall deadline for a single capture
    pub capture_timeout_ms: u64,
    /// Scanner index opened by the facade
    pub device_index: i32,
    /// Location of the JSON template store
    pub store_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: matching::DEFAULT_THRESHOLD,
            force_fallback: true,
            driver_path: None,
            capture_timeout_ms: capture::DEFAULT_TIMEOUT_MS,
            device_index: 0,
            store_path: None,
        }
    }
}

impl EngineConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    /// Template store path, defaulting to the config directory
    pub fn resolved_store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| paths::config_dir().join(paths::STORE_FILE))
    }

    /// Apply overrides from a key lookup (the process environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(env::MATCH_THRESHOLD) {
            self.match_threshold = raw.trim().parse().map_err(|_| {
                RidgelineError::invalid_config("match_threshold", format!("not an integer: {}", raw))
            })?;
        }
        if let Some(raw) = lookup(env::FORCE_FALLBACK) {
            self.force_fallback = parse_bool("force_fallback", &raw)?;
        }
        if let Some(raw) = lookup(env::DRIVER_PATH) {
            let raw = raw.trim();
            self.driver_path = (!raw.is_empty()).then(|| PathBuf::from(raw));
        }
        if let Some(raw) = lookup(env::CAPTURE_TIMEOUT_MS) {
            self.capture_timeout_ms = raw.trim().parse().map_err(|_| {
                RidgelineError::invalid_config("capture_timeout_ms", format!("not an integer: {}", raw))
            })?;
        }
        if let Some(raw) = lookup(env::STORE_PATH) {
            let raw = raw.trim();
            self.store_path = (!raw.is_empty()).then(|| PathBuf::from(raw));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.match_threshold > matching::MAX_SCORE {
            return Err(RidgelineError::invalid_config(
                "match_threshold",
                format!("{} is outside 0-{}", self.match_threshold, matching::MAX_SCORE),
            ));
        }
        if self.capture_timeout_ms == 0 {
            return Err(RidgelineError::invalid_config(
                "capture_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.device_index < 0 {
            return Err(RidgelineError::invalid_config(
                "device_index",
                format!("{} is negative", self.device_index),
            ));
        }
        Ok(())
    }
}

fn parse_bool(field: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(RidgelineError::invalid_config(
            field,
            format!("expected a boolean, got {:?}", other),
        )),
    }
}

/// Get the path to the configuration file
pub fn get_config_path() -> PathBuf {
    paths::config_dir().join(paths::CONFIG_FILE)
}

/// Load a configuration file. A missing file yields the defaults.
pub fn load_config_file(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|e| RidgelineError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content)
        .map_err(|e| RidgelineError::config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Resolve the full configuration: file, then environment, then validation
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let default_path = get_config_path();
    let path = path.unwrap_or(&default_path);

    let mut config = load_config_file(path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;

    info!(
        threshold = config.match_threshold,
        force_fallback = config.force_fallback,
        driver_override = ?config.driver_path,
        "Engine configuration loaded"
    );
    Ok(config)
}
