//! Stable exit codes for autoplan CLI commands.

use crate::error::{EngineError, classify};

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid plan, run id or configuration, or any unclassified error.
pub const INVALID: i32 = 1;
/// The requested run does not exist.
pub const NOT_FOUND: i32 = 2;
/// A step failed; its failure record is persisted and the run can be resumed.
pub const STEP_FAILED: i32 = 3;
/// Another invocation holds the run lock.
pub const LOCKED: i32 = 4;
/// The user declined the proposed plan.
pub const ABORTED: i32 = 5;

/// Exit code for a command that failed with `err`.
pub fn for_error(err: &anyhow::Error) -> i32 {
    match classify(err) {
        Some(EngineError::RunNotFound { .. }) => NOT_FOUND,
        Some(EngineError::StepFailed { .. }) => STEP_FAILED,
        Some(EngineError::RunLocked { .. }) => LOCKED,
        _ => INVALID,
    }
}
