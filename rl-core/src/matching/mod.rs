//! Template matching
//!
//! - `similarity`: fallback byte/bit-level scorer
//! - `engine`: verify (1:1) and identify (1:N) with native/fallback selection
//! - `merge`: multi-sample enrollment merge

pub mod engine;
pub mod merge;
pub mod similarity;

pub use engine::{
    FallbackReason, IdentifyResult, MatchEngine, MatchResult, PairwiseScores, ScoringPath,
};
pub use merge::MergeResult;
pub use similarity::similarity;
