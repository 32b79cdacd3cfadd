//! Plan producers: turn a task description into an understanding and a plan.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::core::invariants::validate_plan;
use crate::core::types::{ExecutionPlan, PlanStep, TaskUnderstanding};
use crate::error::EngineError;

const PLAN_SCHEMA: &str = include_str!("../schemas/plan.schema.json");

/// Anything that can produce an understanding and plan for a task.
///
/// Failures are fatal before execution: the engine never sees a partial plan.
pub trait PlanProducer: Send + Sync {
    fn produce(
        &self,
        task: &str,
        feedback: Option<&str>,
    ) -> Result<(TaskUnderstanding, ExecutionPlan)>;
}

/// Deterministic producer for running without an external planning service.
#[derive(Debug, Clone)]
pub struct OfflinePlanner {
    dataset: PathBuf,
}

impl OfflinePlanner {
    pub fn new(dataset: impl Into<PathBuf>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }

    pub fn understand(&self, task: &str) -> TaskUnderstanding {
        TaskUnderstanding {
            objective: task.trim().to_string(),
            data_scope: "to be confirmed".to_string(),
            time_range: "to be confirmed".to_string(),
            business_context: "to be confirmed".to_string(),
            assumptions: vec!["no external data details provided".to_string()],
            ..TaskUnderstanding::default()
        }
    }

    pub fn plan(&self, _understanding: &TaskUnderstanding) -> ExecutionPlan {
        let mut load = step(
            "load_data",
            "load_records",
            "read the source records",
            &["task understanding"],
            &["raw records"],
        );
        load.parameters
            .insert("path".to_string(), json!(self.dataset.display().to_string()));

        let clean = step(
            "data_clean",
            "data_clean",
            "drop duplicate rows and fill missing values",
            &["raw records"],
            &["clean records"],
        );
        let describe = step(
            "describe",
            "describe",
            "descriptive statistics for numeric columns",
            &["clean records"],
            &["summary"],
        );
        let report = step(
            "report",
            "report",
            "render the Markdown report",
            &["summary"],
            &["report"],
        );

        ExecutionPlan {
            summary: "default offline plan".to_string(),
            steps: vec![
                load,
                with_dependency(clean, "load_data"),
                with_dependency(describe, "data_clean"),
                with_dependency(report, "describe"),
            ],
        }
    }
}

impl PlanProducer for OfflinePlanner {
    fn produce(
        &self,
        task: &str,
        feedback: Option<&str>,
    ) -> Result<(TaskUnderstanding, ExecutionPlan)> {
        let mut understanding = self.understand(task);
        let mut plan = self.plan(&understanding);
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            understanding = understanding.with_feedback(feedback);
            plan = self.plan(&understanding);
            plan.summary = format!("{} (revised with feedback)", plan.summary);
        }
        Ok((understanding, plan))
    }
}

/// Reads `{understanding?, plan}` from a JSON file, checked against the bundled schema.
#[derive(Debug, Clone)]
pub struct FilePlanner {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    understanding: Option<TaskUnderstanding>,
    plan: ExecutionPlan,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlanProducer for FilePlanner {
    fn produce(
        &self,
        task: &str,
        feedback: Option<&str>,
    ) -> Result<(TaskUnderstanding, ExecutionPlan)> {
        debug!(path = %self.path.display(), "reading plan file");
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read plan file {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse plan file {}", self.path.display()))?;
        validate_schema(&value)?;

        let file: PlanFile = serde_json::from_value(value)
            .with_context(|| format!("decode plan file {}", self.path.display()))?;
        let errors = validate_plan(&file.plan);
        if !errors.is_empty() {
            return Err(EngineError::validation(errors).into());
        }

        let mut understanding = file.understanding.unwrap_or_default();
        if understanding.objective.trim().is_empty() {
            understanding.objective = task.trim().to_string();
        }
        if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
            understanding = understanding.with_feedback(feedback);
        }
        Ok((understanding, file.plan))
    }
}

/// Validate a plan file against the bundled JSON Schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse bundled plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("invalid plan schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(EngineError::validation(messages).into());
    }
    Ok(())
}

fn step(name: &str, tool: &str, description: &str, inputs: &[&str], outputs: &[&str]) -> PlanStep {
    PlanStep {
        description: description.to_string(),
        inputs: inputs.iter().map(ToString::to_string).collect(),
        outputs: outputs.iter().map(ToString::to_string).collect(),
        ..PlanStep::new(name, tool)
    }
}

fn with_dependency(mut step: PlanStep, dependency: &str) -> PlanStep {
    step.dependencies.push(dependency.to_string());
    step
}
