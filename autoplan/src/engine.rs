//! Sequential plan executor with checkpoint-based resume.
//!
//! Every executed step appends one [`StepResult`] to the run's history and the
//! history is persisted before the next step starts. Steps that already
//! succeeded in the same run are skipped on later invocations.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::context::RunContext;
use crate::core::invariants::validate_plan;
use crate::core::resume::{StepAction, StepPhase, completed_step_names, last_success, schedule};
use crate::core::types::{ExecutionPlan, StepResult, StepStatus, TaskUnderstanding};
use crate::error::EngineError;
use crate::io::config::Settings;
use crate::io::run_state::{RunState, RunStore};
use crate::tools::{Tool, ToolRegistry};

/// What one engine invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// Only the results appended by this invocation, in execution order.
    pub steps: Vec<StepResult>,
}

#[derive(Debug, Clone)]
pub struct Engine {
    settings: Settings,
    registry: ToolRegistry,
    store: RunStore,
}

impl Engine {
    pub fn new(settings: Settings, registry: ToolRegistry, store: RunStore) -> Self {
        Self {
            settings,
            registry,
            store,
        }
    }

    /// Engine whose store lives in `settings.state_dir`.
    pub fn from_settings(settings: Settings, registry: ToolRegistry) -> Self {
        let store = RunStore::new(settings.state_dir.clone());
        Self::new(settings, registry, store)
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Execute `plan` under `run_id` (a new run when `None`).
    ///
    /// Re-running an existing id resumes it: steps with a recorded success are
    /// skipped and their tools rebuild context from the stored payload.
    #[instrument(skip_all, fields(run_id = ?run_id, steps = plan.steps.len()))]
    pub fn run(
        &self,
        plan: &ExecutionPlan,
        understanding: &TaskUnderstanding,
        run_id: Option<&str>,
    ) -> Result<RunOutcome> {
        let errors = validate_plan(plan);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors).into());
        }

        let run_id = match run_id {
            Some(id) => id.to_string(),
            None => self.store.create()?,
        };
        let _lock = self.store.lock(&run_id)?;

        let mut state = if self.store.exists(&run_id) {
            self.store.load(&run_id)?
        } else {
            info!(run_id = %run_id, "seeding state for external run id");
            RunState::new(run_id.clone())
        };
        if state.attach_inputs(understanding, plan) {
            self.store.save(&run_id, &state)?;
        }

        let completed = completed_step_names(&state.steps);
        let scheduled = schedule(plan, &completed);

        // Every step still to execute must name a registered tool before any side effect.
        self.registry.ensure_known(
            scheduled
                .iter()
                .filter(|entry| entry.action == StepAction::Execute)
                .map(|entry| entry.step),
        )?;
        let tools: Vec<Option<Arc<dyn Tool>>> = scheduled
            .iter()
            .map(|entry| self.registry.find(&entry.step.tool))
            .collect();

        let context_understanding = state
            .understanding
            .clone()
            .unwrap_or_else(|| understanding.clone());
        let mut context = RunContext::new(run_id.clone(), context_understanding);
        let mut produced = Vec::new();

        for (entry, tool) in scheduled.iter().zip(tools) {
            let step = entry.step;
            context.step.clone_from(&step.name);

            if entry.action == StepAction::Skip {
                if let (Some(tool), Some(previous)) = (tool, last_success(&state.steps, &step.name))
                {
                    tool.restore(&self.settings, &mut context, &previous.payload)
                        .map_err(|err| {
                            err.context(EngineError::ContextRestore {
                                step: step.name.clone(),
                            })
                        })?;
                }
                continue;
            }

            let Some(tool) = tool else {
                return Err(EngineError::ToolNotFound {
                    name: step.tool.clone(),
                }
                .into());
            };

            let phase = StepPhase::from_history(&step.name, &state.steps)
                .start()
                .map_err(|msg| anyhow!(msg))?;
            info!(run_id = %run_id, step = %step.name, tool = %step.tool, "step started");

            match tool.invoke(&self.settings, &mut context, &step.parameters) {
                Ok(payload) => {
                    phase
                        .finish(StepStatus::Success)
                        .map_err(|msg| anyhow!(msg))?;
                    let result = StepResult::success(step.name.clone(), payload);
                    state.record(result.clone());
                    self.store.save(&run_id, &state)?;
                    produced.push(result);
                    info!(run_id = %run_id, step = %step.name, tool = %step.tool, "step succeeded");
                }
                Err(err) => {
                    phase
                        .finish(StepStatus::Failed)
                        .map_err(|msg| anyhow!(msg))?;
                    warn!(
                        run_id = %run_id,
                        step = %step.name,
                        tool = %step.tool,
                        error = %err,
                        "step failed"
                    );
                    state.record(StepResult::failed(step.name.clone(), err.to_string()));
                    let failed = EngineError::StepFailed {
                        run_id: run_id.clone(),
                        step: step.name.clone(),
                    };
                    if let Err(save_err) = self.store.save(&run_id, &state) {
                        return Err(save_err
                            .context(format!("record failure of step {}: {err:#}", step.name))
                            .context(failed));
                    }
                    return Err(err.context(failed));
                }
            }
        }

        info!(run_id = %run_id, executed = produced.len(), "run finished");
        Ok(RunOutcome {
            run_id,
            steps: produced,
        })
    }

    /// Re-execute the persisted plan and understanding of an existing run.
    pub fn resume(&self, run_id: &str) -> Result<RunOutcome> {
        let state = self.store.load(run_id)?;
        let (Some(understanding), Some(plan)) = (state.understanding, state.plan) else {
            return Err(EngineError::IncompleteRun {
                run_id: run_id.to_string(),
            }
            .into());
        };
        self.run(&plan, &understanding, Some(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingTool, FailingTool, echo_plan, engine_with};
    use serde_json::json;

    #[test]
    fn empty_plan_records_inputs() {
        let (_temp, engine) = engine_with(ToolRegistry::new());
        let plan = ExecutionPlan {
            summary: "nothing".to_string(),
            steps: Vec::new(),
        };
        let outcome = engine
            .run(&plan, &TaskUnderstanding::default(), None)
            .expect("run");

        assert!(outcome.steps.is_empty());
        let state = engine.store().load(&outcome.run_id).expect("load");
        assert_eq!(state.plan, Some(plan));
        assert!(state.understanding.is_some());
    }

    #[test]
    fn failure_payload_has_top_level_message_only() {
        let mut registry = ToolRegistry::new();
        registry.register("fail", FailingTool::new("boom"));
        let (_temp, engine) = engine_with(registry);

        let err = engine
            .run(&echo_plan(&[("x", "fail")]), &TaskUnderstanding::default(), Some("run-f"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::StepFailed { step, .. }) if step == "x"
        ));

        let state = engine.store().load("run-f").expect("load");
        assert_eq!(state.steps.len(), 1);
        assert_eq!(state.steps[0].payload.get("error"), Some(&json!("boom")));
    }

    #[test]
    fn resume_without_inputs_is_incomplete() {
        let (_temp, engine) = engine_with(ToolRegistry::new());
        let run_id = engine.store().create().expect("create");
        let err = engine.resume(&run_id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::IncompleteRun { .. })
        ));
    }

    #[test]
    fn unsaved_failure_keeps_step_failed_and_tool_message() {
        let mut registry = ToolRegistry::new();
        registry.register("fail", FailingTool::new("boom"));
        let (_temp, engine) = engine_with(registry);
        let plan = echo_plan(&[("x", "fail")]);
        engine
            .run(&plan, &TaskUnderstanding::default(), Some("run-s"))
            .unwrap_err();

        // The next save of this run cannot replace its temp path.
        let tmp = engine.store().path("run-s").with_extension("json.tmp");
        std::fs::create_dir_all(&tmp).expect("mkdir");

        let err = engine
            .run(&plan, &TaskUnderstanding::default(), Some("run-s"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::StepFailed { step, .. }) if step == "x"
        ));
        assert!(format!("{err:#}").contains("boom"));
    }

    #[test]
    fn lock_is_released_after_run() {
        let counter = CountingTool::new();
        let mut registry = ToolRegistry::new();
        registry.register("count", counter.clone());
        let (_temp, engine) = engine_with(registry);

        engine
            .run(&echo_plan(&[("a", "count")]), &TaskUnderstanding::default(), Some("run-l"))
            .expect("run");
        assert!(!engine.store().is_locked("run-l"));
        assert_eq!(counter.calls(), 1);
    }
}
