//! Error types re-exported from rl-error

pub use rl_error::{Result, RidgelineError};
