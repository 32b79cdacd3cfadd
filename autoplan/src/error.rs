//! Classified failures surfaced by the engine, store and registry.
//!
//! Functions return `anyhow::Result`; callers that need to react to a specific
//! failure use `err.downcast_ref::<EngineError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A step names a tool absent from the registry. Configuration error; never retried.
    #[error("tool not registered: {name}")]
    ToolNotFound { name: String },

    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    /// A tool invocation failed. The `failed` record is already persisted.
    #[error("step '{step}' failed in run {run_id}")]
    StepFailed { run_id: String, step: String },

    #[error("validation failed:\n- {}", errors.join("\n- "))]
    Validation { errors: Vec<String> },

    #[error("run {run_id} is locked by another invocation ({})", path.display())]
    RunLocked { run_id: String, path: PathBuf },

    #[error("run {run_id} has no persisted plan or understanding")]
    IncompleteRun { run_id: String },

    #[error("could not restore context for skipped step '{step}'")]
    ContextRestore { step: String },
}

impl EngineError {
    pub fn validation(errors: Vec<String>) -> Self {
        Self::Validation { errors }
    }
}

/// Find the outermost [`EngineError`] attached to `err`, as an error or as context.
pub fn classify(err: &anyhow::Error) -> Option<&EngineError> {
    err.downcast_ref::<EngineError>().or_else(|| {
        err.chain()
            .find_map(|cause| cause.downcast_ref::<EngineError>())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, anyhow};

    #[test]
    fn classify_finds_wrapped_engine_error() {
        let err = Err::<(), _>(anyhow!("boom"))
            .context(EngineError::StepFailed {
                run_id: "run-1".to_string(),
                step: "x".to_string(),
            })
            .unwrap_err();

        assert!(matches!(
            classify(&err),
            Some(EngineError::StepFailed { step, .. }) if step == "x"
        ));
        assert_eq!(err.root_cause().to_string(), "boom");
    }

    #[test]
    fn validation_message_lists_every_error() {
        let err = EngineError::validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation failed:\n- a\n- b");
    }
}
