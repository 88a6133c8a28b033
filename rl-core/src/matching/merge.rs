//! Enrollment sample merging
//!
//! Several captures of the same finger become one stored template. With the
//! native merge entry point and at least three usable samples the driver
//! fuses the first three; otherwise the sample that agrees best with the
//! others is kept as-is.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::engine::{FallbackReason, MatchEngine, PairwiseScores, ScoringPath};
use crate::constants::{codes, matching};
use crate::device::SessionState;
use crate::error::{Result, RidgelineError};
use crate::template::Template;

/// Chosen template plus the metrics that led to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    pub template: Template,
    /// Length of each usable sample, in input order
    pub lens: Vec<usize>,
    /// Pairwise scores between usable samples; the diagonal is empty
    pub pairwise: Vec<Vec<Option<u32>>>,
    /// True when the driver fused the samples
    pub merged: bool,
    /// Driver return code, present when native merge was attempted
    pub merge_code: Option<i32>,
    pub best_len: usize,
    /// Scorer behind `pairwise`; None when there was nothing to compare
    pub scoring: Option<ScoringPath>,
    pub fallback: Option<FallbackReason>,
}

impl MatchEngine {
    /// Merge enrollment samples into one template.
    ///
    /// At least two samples must be supplied. Empty samples are ignored; a
    /// single remaining sample is returned unchanged.
    pub fn merge(&self, samples: &[Template]) -> Result<MergeResult> {
        if samples.len() < matching::MIN_MERGE_SAMPLES {
            return Err(RidgelineError::InsufficientSamples {
                required: matching::MIN_MERGE_SAMPLES,
                found: samples.len(),
            });
        }

        let usable: Vec<&Template> = samples.iter().filter(|t| !t.is_empty()).collect();
        if usable.is_empty() {
            return Err(RidgelineError::InsufficientSamples {
                required: matching::MIN_MERGE_SAMPLES,
                found: 0,
            });
        }

        let lens: Vec<usize> = usable.iter().map(|t| t.len()).collect();

        if let [only] = usable.as_slice() {
            debug!(len = only.len(), "Single usable sample, nothing to merge");
            return Ok(MergeResult {
                template: (*only).clone(),
                best_len: only.len(),
                lens,
                pairwise: vec![vec![None]],
                merged: false,
                merge_code: None,
                scoring: None,
                fallback: None,
            });
        }

        let bytes: Vec<&[u8]> = usable.iter().map(|t| t.as_bytes()).collect();
        let PairwiseScores {
            matrix,
            path,
            fallback,
        } = self.pairwise_scores(&bytes);

        let mut merge_code = None;
        if usable.len() >= matching::NATIVE_MERGE_SAMPLES {
            if let Some((code, fused)) = self.native_merge(bytes[0], bytes[1], bytes[2]) {
                merge_code = Some(code);
                if code == codes::OK && !fused.is_empty() {
                    info!(len = fused.len(), "Samples merged by driver");
                    return Ok(MergeResult {
                        best_len: fused.len(),
                        template: Template::new(fused),
                        lens,
                        pairwise: matrix,
                        merged: true,
                        merge_code,
                        scoring: Some(path),
                        fallback,
                    });
                }
                warn!(code, "Native merge failed, keeping best sample");
            }
        }

        let best = best_sample(&matrix);
        let template = usable[best].clone();
        info!(
            index = best,
            len = template.len(),
            samples = usable.len(),
            "Best enrollment sample selected"
        );

        Ok(MergeResult {
            best_len: template.len(),
            template,
            lens,
            pairwise: matrix,
            merged: false,
            merge_code,
            scoring: Some(path),
            fallback,
        })
    }

    /// Attempt the driver's three-sample merge. None when it cannot be tried.
    fn native_merge(&self, first: &[u8], second: &[u8], third: &[u8]) -> Option<(i32, Vec<u8>)> {
        let outcome = self.devices().with_session(|session| {
            if !session.capabilities().merge {
                return Ok(None);
            }
            if matches!(session.state(), SessionState::Uninitialized) {
                session.initialize()?;
            }
            Ok(Some(session.native_merge(first, second, third)))
        });

        match outcome {
            Ok(Some(Ok(merged))) => Some(merged),
            Ok(Some(Err(e))) => {
                warn!(error = %e, "Native merge call failed");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "Native merge unavailable");
                None
            }
        }
    }
}

/// Index of the sample with the highest score sum against all others.
/// Ties go to the earliest sample.
fn best_sample(matrix: &[Vec<Option<u32>>]) -> usize {
    let mut best_idx = 0;
    let mut best_sum: i64 = -1;
    for (idx, row) in matrix.iter().enumerate() {
        let sum: i64 = row.iter().flatten().map(|&s| i64::from(s)).sum();
        if sum > best_sum {
            best_idx = idx;
            best_sum = sum;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::session::tests::full_capabilities;
    use crate::driver::Capabilities;
    use crate::matching::engine::tests::engine_with;

    fn far() -> Template {
        Template::new(vec![0xFF; 16])
    }

    fn near_a() -> Template {
        Template::new(vec![0x00; 16])
    }

    fn near_b() -> Template {
        let mut bytes = vec![0x00; 16];
        bytes[3] = 0x01;
        Template::new(bytes)
    }

    #[test]
    fn test_requires_two_supplied_samples() {
        let engine = engine_with(true, full_capabilities(), |_| {});
        assert!(matches!(
            engine.merge(&[near_a()]),
            Err(RidgelineError::InsufficientSamples { required: 2, found: 1 })
        ));
    }

    #[test]
    fn test_all_empty_samples_rejected() {
        let engine = engine_with(true, full_capabilities(), |_| {});
        assert!(matches!(
            engine.merge(&[Template::default(), Template::default()]),
            Err(RidgelineError::InsufficientSamples { found: 0, .. })
        ));
    }

    #[test]
    fn test_single_usable_sample_returned_unchanged() {
        let engine = engine_with(true, full_capabilities(), |mock| {
            mock.expect_merge_templates().never();
        });
        let result = engine.merge(&[Template::default(), near_b()]).unwrap();
        assert_eq!(result.template, near_b());
        assert!(!result.merged);
        assert_eq!(result.lens, vec![16]);
        assert_eq!(result.best_len, 16);
    }

    #[test]
    fn test_two_samples_never_use_native_merge() {
        let engine = engine_with(true, full_capabilities(), |mock| {
            mock.expect_merge_templates().never();
        });
        let result = engine.merge(&[far(), near_a()]).unwrap();
        assert!(!result.merged);
        assert!(result.merge_code.is_none());
        assert_eq!(result.template, far());
        assert_eq!(result.pairwise[0][0], None);
    }

    #[test]
    fn test_best_sum_selection_prefers_first_tie() {
        let caps = Capabilities {
            merge: false,
            ..full_capabilities()
        };
        let engine = engine_with(true, caps, |mock| {
            mock.expect_merge_templates().never();
        });

        let result = engine.merge(&[far(), near_a(), near_b()]).unwrap();
        assert!(!result.merged);
        assert_eq!(result.template, near_a());
        assert_eq!(result.scoring, Some(ScoringPath::Fallback));
        assert_eq!(result.pairwise.len(), 3);
        assert!(result.pairwise.iter().enumerate().all(|(i, row)| row[i].is_none()));
    }

    #[test]
    fn test_native_merge_uses_first_three() {
        let engine = engine_with(true, full_capabilities(), |mock| {
            mock.expect_merge_templates().times(1).returning(
                |first: &[u8], _: &[u8], _: &[u8], out: &mut [u8]| {
                    assert_eq!(first, &[0xFF; 16][..]);
                    out[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
                    Ok((0, 5))
                },
            );
        });

        let samples = [far(), near_a(), near_b(), near_a()];
        let result = engine.merge(&samples).unwrap();
        assert!(result.merged);
        assert_eq!(result.merge_code, Some(0));
        assert_eq!(result.template.as_bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(result.best_len, 5);
        assert_eq!(result.lens.len(), 4);
    }

    #[test]
    fn test_native_merge_failure_falls_back_to_best_sample() {
        let engine = engine_with(true, full_capabilities(), |mock| {
            mock.expect_merge_templates()
                .returning(|_: &[u8], _: &[u8], _: &[u8], _: &mut [u8]| Ok((-2, 0)));
        });

        let result = engine.merge(&[far(), near_a(), near_b()]).unwrap();
        assert!(!result.merged);
        assert_eq!(result.merge_code, Some(-2));
        assert_eq!(result.template, near_a());
    }
}
