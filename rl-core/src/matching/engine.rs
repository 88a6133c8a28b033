//! Verify and identify
//!
//! Every decision is made on a single 0-100 scale against one threshold. The
//! native matcher is preferred when it is enabled and ready; otherwise, or when
//! it faults, the fallback similarity scorer decides. Whichever path produced
//! a score is reported alongside it.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::similarity::similarity;
use crate::config::EngineConfig;
use crate::constants::{codes, sensor};
use crate::device::{DeviceManager, DeviceSession, SessionState};
use crate::driver::NativeScore;
use crate::template::Template;

// ============================================================================
// Result Types
// ============================================================================

/// Why the fallback scorer was used instead of the native matcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FallbackReason {
    ForcedByConfig,
    DriverUnavailable,
    DriverInitFailed { code: i32 },
    MatcherUnsupported,
    DatabaseUnavailable,
    /// The driver returned a negative score
    NativeFault { code: i32 },
    NativeCallFailed { message: String },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForcedByConfig => write!(f, "native matcher disabled by configuration"),
            Self::DriverUnavailable => write!(f, "driver not available"),
            Self::DriverInitFailed { code } => write!(f, "driver init failed ({})", code),
            Self::MatcherUnsupported => write!(f, "driver has no native matcher"),
            Self::DatabaseUnavailable => write!(f, "native matcher database not ready"),
            Self::NativeFault { code } => write!(f, "native matcher fault ({})", code),
            Self::NativeCallFailed { message } => write!(f, "native call failed: {}", message),
        }
    }
}

/// Which scorer produced a set of scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPath {
    Native,
    Fallback,
}

/// Outcome of a 1:1 comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub score: u32,
    pub threshold: u32,
    pub len_stored: usize,
    pub len_live: usize,
    /// Present exactly when the fallback scorer decided
    pub fallback: Option<FallbackReason>,
}

/// Outcome of a 1:N search
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyResult {
    pub matched: bool,
    /// Best-scoring subject; withheld when the score is below threshold
    pub subject_id: Option<String>,
    pub score: u32,
    pub threshold: u32,
    pub fallback: Option<FallbackReason>,
    pub candidates: usize,
    pub message: Option<String>,
}

/// Full pairwise score matrix; the diagonal is empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairwiseScores {
    pub matrix: Vec<Vec<Option<u32>>>,
    pub path: ScoringPath,
    pub fallback: Option<FallbackReason>,
}

// ============================================================================
// Match Engine
// ============================================================================

pub struct MatchEngine {
    devices: Arc<DeviceManager>,
    threshold: u32,
    force_fallback: bool,
}

impl MatchEngine {
    pub fn new(devices: Arc<DeviceManager>, config: &EngineConfig) -> Self {
        Self {
            devices,
            threshold: config.match_threshold,
            force_fallback: config.force_fallback,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn force_fallback(&self) -> bool {
        self.force_fallback
    }

    pub(crate) fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Compare a stored template with a live one
    pub fn verify(&self, stored: &[u8], live: &[u8]) -> MatchResult {
        let native = self.with_native(|session| native_score(session, stored, live));

        let (score, fallback) = match native {
            Ok(score) => (score, None),
            Err(reason) => {
                debug!(%reason, "Verifying with fallback scorer");
                (similarity(stored, live), Some(reason))
            }
        };

        let matched = score >= self.threshold;
        info!(
            score,
            threshold = self.threshold,
            matched,
            native = fallback.is_none(),
            "Verify complete"
        );

        MatchResult {
            matched,
            score,
            threshold: self.threshold,
            len_stored: stored.len(),
            len_live: live.len(),
            fallback,
        }
    }

    /// Find the best-scoring candidate for a live template.
    ///
    /// One scorer is used for the whole scan. If any native comparison faults,
    /// all native scores are discarded and every candidate is rescored with the
    /// fallback scorer. Ties go to the earliest candidate.
    pub fn identify(&self, live: &[u8], candidates: &[(String, Template)]) -> IdentifyResult {
        if candidates.is_empty() {
            return IdentifyResult {
                matched: false,
                subject_id: None,
                score: 0,
                threshold: self.threshold,
                fallback: None,
                candidates: 0,
                message: Some("no enrolled templates".to_string()),
            };
        }

        let native = self.with_native(|session| {
            candidates
                .iter()
                .map(|(_, stored)| native_score(session, stored.as_bytes(), live))
                .collect::<Result<Vec<u32>, FallbackReason>>()
        });

        let (scores, fallback) = match native {
            Ok(scores) => (scores, None),
            Err(reason) => {
                debug!(%reason, candidates = candidates.len(), "Identifying with fallback scorer");
                let scores = candidates
                    .iter()
                    .map(|(_, stored)| similarity(stored.as_bytes(), live))
                    .collect();
                (scores, Some(reason))
            }
        };

        let mut best: Option<(usize, u32)> = None;
        for (idx, &score) in scores.iter().enumerate() {
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((idx, score));
            }
        }

        let (best_idx, score) = best.unwrap_or((0, 0));
        let matched = score >= self.threshold;
        let subject_id = matched.then(|| candidates[best_idx].0.clone());

        info!(
            score,
            threshold = self.threshold,
            matched,
            candidates = candidates.len(),
            native = fallback.is_none(),
            "Identify complete"
        );

        IdentifyResult {
            matched,
            subject_id,
            score,
            threshold: self.threshold,
            fallback,
            candidates: candidates.len(),
            message: None,
        }
    }

    /// Score every ordered pair of samples with one scorer
    pub fn pairwise_scores(&self, samples: &[&[u8]]) -> PairwiseScores {
        let n = samples.len();
        let native = self.with_native(|session| {
            let mut matrix = vec![vec![None; n]; n];
            for i in 0..n {
                for j in 0..n {
                    if i != j {
                        matrix[i][j] = Some(native_score(session, samples[i], samples[j])?);
                    }
                }
            }
            Ok(matrix)
        });

        match native {
            Ok(matrix) => PairwiseScores {
                matrix,
                path: ScoringPath::Native,
                fallback: None,
            },
            Err(reason) => {
                let matrix = (0..n)
                    .map(|i| {
                        (0..n)
                            .map(|j| (i != j).then(|| similarity(samples[i], samples[j])))
                            .collect()
                    })
                    .collect();
                PairwiseScores {
                    matrix,
                    path: ScoringPath::Fallback,
                    fallback: Some(reason),
                }
            }
        }
    }

    /// Run `f` with a session whose native matcher is ready, or report why not
    fn with_native<T, F>(&self, f: F) -> Result<T, FallbackReason>
    where
        F: FnOnce(&DeviceSession) -> Result<T, FallbackReason>,
    {
        if self.force_fallback {
            return Err(FallbackReason::ForcedByConfig);
        }

        let outcome = self.devices.with_session(|session| {
            Ok(prepare_native(session).and_then(|()| f(session)))
        });

        match outcome {
            Ok(result) => result,
            Err(e) => {
                debug!(error = %e, "Native matcher unavailable");
                Err(FallbackReason::DriverUnavailable)
            }
        }
    }
}

fn prepare_native(session: &mut DeviceSession) -> Result<(), FallbackReason> {
    if matches!(session.state(), SessionState::Uninitialized) {
        if let Err(e) = session.initialize() {
            return Err(FallbackReason::DriverInitFailed {
                code: e.driver_code().unwrap_or(codes::INIT_FAILED),
            });
        }
    }

    if !session.capabilities().native_match() {
        return Err(FallbackReason::MatcherUnsupported);
    }

    if !session
        .ensure_matcher_database(sensor::MATCHER_DB_CAPACITY)
        .is_ready()
    {
        return Err(FallbackReason::DatabaseUnavailable);
    }
    Ok(())
}

fn native_score(session: &DeviceSession, first: &[u8], second: &[u8]) -> Result<u32, FallbackReason> {
    match session.native_match(first, second) {
        Ok(NativeScore::Score(score)) => Ok(score),
        Ok(NativeScore::Fault(code)) => {
            warn!(code, "Native matcher returned a fault");
            Err(FallbackReason::NativeFault { code })
        }
        Err(e) => {
            warn!(error = %e, "Native match call failed");
            Err(FallbackReason::NativeCallFailed {
                message: e.to_string(),
            })
        }
    }
}
