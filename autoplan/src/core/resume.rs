//! Resume checkpoint and per-step state machine.
//!
//! A step moves `pending -> running -> {success, failed}`. `success` is
//! terminal and makes the step skip-eligible on every later invocation of the
//! same run. `failed` stops the run but sends the step back to `pending` the
//! next time the run is resumed.

use std::collections::BTreeSet;

use crate::core::types::{ExecutionPlan, PlanStep, StepResult, StepStatus};

/// Lifecycle phase of a single step within one engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl StepPhase {
    /// Phase a step starts in for this invocation, given its recorded history.
    ///
    /// A prior failure does not carry over: the step is pending again.
    pub fn from_history(step_name: &str, history: &[StepResult]) -> Self {
        let succeeded = history
            .iter()
            .any(|result| result.step_name == step_name && result.is_success());
        if succeeded {
            Self::Succeeded
        } else {
            Self::Pending
        }
    }

    /// `pending -> running`.
    pub fn start(self) -> Result<Self, String> {
        match self {
            Self::Pending => Ok(Self::Running),
            other => Err(format!("cannot start a step in phase {other:?}")),
        }
    }

    /// `running -> success | failed`.
    pub fn finish(self, status: StepStatus) -> Result<Self, String> {
        match self {
            Self::Running => Ok(match status {
                StepStatus::Success => Self::Succeeded,
                StepStatus::Failed => Self::Failed,
            }),
            other => Err(format!("cannot finish a step in phase {other:?}")),
        }
    }
}

/// Names of steps with at least one `success` record. This is the resume checkpoint.
pub fn completed_step_names(history: &[StepResult]) -> BTreeSet<String> {
    history
        .iter()
        .filter(|result| result.is_success())
        .map(|result| result.step_name.clone())
        .collect()
}

/// Most recent successful result recorded for `step_name`.
pub fn last_success<'a>(history: &'a [StepResult], step_name: &str) -> Option<&'a StepResult> {
    history
        .iter()
        .rev()
        .find(|result| result.step_name == step_name && result.is_success())
}

/// What the engine does with a plan step during one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Already succeeded in this run; not invoked again.
    Skip,
    /// Not yet succeeded; will be invoked.
    Execute,
}

/// A plan step paired with the action the engine takes for it.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledStep<'a> {
    pub step: &'a PlanStep,
    pub action: StepAction,
}

/// Pair every plan step, in plan order, with its skip/execute decision.
pub fn schedule<'a>(
    plan: &'a ExecutionPlan,
    completed: &BTreeSet<String>,
) -> Vec<ScheduledStep<'a>> {
    plan.steps
        .iter()
        .map(|step| ScheduledStep {
            step,
            action: if completed.contains(&step.name) {
                StepAction::Skip
            } else {
                StepAction::Execute
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Payload, PlanStep};

    fn history() -> Vec<StepResult> {
        vec![
            StepResult::success("a", Payload::new()),
            StepResult::success("b", Payload::new()),
            StepResult::failed("c", "boom"),
        ]
    }

    #[test]
    fn completed_names_only_include_successes() {
        let completed = completed_step_names(&history());
        let names: Vec<&str> = completed.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn failed_then_succeeded_step_is_completed() {
        let mut history = history();
        history.push(StepResult::success("c", Payload::new()));
        assert!(completed_step_names(&history).contains("c"));
        assert_eq!(StepPhase::from_history("c", &history), StepPhase::Succeeded);
    }

    #[test]
    fn failed_step_returns_to_pending() {
        let phase = StepPhase::from_history("c", &history());
        assert_eq!(phase, StepPhase::Pending);

        let running = phase.start().expect("start");
        assert_eq!(running, StepPhase::Running);
        assert_eq!(
            running.finish(StepStatus::Failed).expect("finish"),
            StepPhase::Failed
        );
    }

    #[test]
    fn succeeded_step_cannot_restart() {
        let phase = StepPhase::from_history("a", &history());
        assert_eq!(phase, StepPhase::Succeeded);
        assert!(phase.start().is_err());
        assert!(StepPhase::Pending.finish(StepStatus::Success).is_err());
    }

    #[test]
    fn schedule_preserves_plan_order() {
        let plan = ExecutionPlan {
            summary: "t".to_string(),
            steps: vec![
                PlanStep::new("a", "echo"),
                PlanStep::new("b", "echo"),
                PlanStep::new("c", "echo"),
            ],
        };
        let completed = completed_step_names(&history());

        let actions: Vec<(&str, StepAction)> = schedule(&plan, &completed)
            .iter()
            .map(|entry| (entry.step.name.as_str(), entry.action))
            .collect();
        assert_eq!(
            actions,
            vec![
                ("a", StepAction::Skip),
                ("b", StepAction::Skip),
                ("c", StepAction::Execute),
            ]
        );
    }

    #[test]
    fn last_success_prefers_most_recent_entry() {
        let mut first = Payload::new();
        first.insert("n".to_string(), 1.into());
        let mut second = Payload::new();
        second.insert("n".to_string(), 2.into());
        let history = vec![
            StepResult::success("a", first),
            StepResult::success("a", second.clone()),
        ];

        let found = last_success(&history, "a").expect("found");
        assert_eq!(found.payload, second);
        assert!(last_success(&history, "missing").is_none());
    }
}
