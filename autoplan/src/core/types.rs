//! Shared data model for plans, steps and step results.
//!
//! These types define the stable contract between the plan producer, the
//! engine and the run store. Field names are part of the persisted document
//! format and must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form key/value payload returned by a tool (or `{"error": ..}` on failure).
pub type Payload = Map<String, Value>;

/// Per-step parameters passed verbatim to the tool.
pub type Params = Map<String, Value>;

/// Structured understanding of the task a plan was produced for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskUnderstanding {
    pub objective: String,
    pub data_scope: String,
    pub time_range: String,
    pub business_context: String,
    pub constraints: Vec<String>,
    pub risks: Vec<String>,
    pub assumptions: Vec<String>,
}

impl TaskUnderstanding {
    /// Build a new understanding with user feedback appended to the business context.
    ///
    /// The receiver is left untouched; feedback never mutates an understanding in place.
    pub fn with_feedback(&self, feedback: &str) -> Self {
        let feedback = feedback.trim();
        let business_context = if self.business_context.trim().is_empty() {
            format!("User feedback: {feedback}")
        } else {
            format!("{}\nUser feedback: {feedback}", self.business_context)
        };
        Self {
            business_context,
            ..self.clone()
        }
    }
}

/// One named unit of work bound to a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Declared for readers; execution order is plan order.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub parameters: Params,
}

impl PlanStep {
    pub fn new(name: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            dependencies: Vec::new(),
            tool: tool.into(),
            parameters: Params::new(),
        }
    }
}

/// Ordered list of steps plus a human-readable summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
}

/// Terminal outcome of a single step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Append-only record of one step execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub status: StepStatus,
    #[serde(default)]
    pub payload: Payload,
}

impl StepResult {
    pub fn success(step_name: impl Into<String>, payload: Payload) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Success,
            payload,
        }
    }

    /// Failed result carrying only the error message (`{"error": message}`).
    pub fn failed(step_name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("error".to_string(), Value::String(message.into()));
        Self {
            step_name: step_name.into(),
            status: StepStatus::Failed,
            payload,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_result_serializes_with_lowercase_status() {
        let result = StepResult::failed("x", "boom");
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(
            value,
            json!({"step_name": "x", "status": "failed", "payload": {"error": "boom"}})
        );
    }

    #[test]
    fn plan_step_defaults_missing_fields() {
        let step: PlanStep =
            serde_json::from_value(json!({"name": "a", "tool": "echo"})).expect("parse");
        assert_eq!(step.name, "a");
        assert!(step.inputs.is_empty());
        assert!(step.parameters.is_empty());
        assert!(step.description.is_empty());
    }

    #[test]
    fn feedback_produces_new_understanding() {
        let original = TaskUnderstanding {
            objective: "revenue trend".to_string(),
            business_context: "solar sector".to_string(),
            ..TaskUnderstanding::default()
        };
        let updated = original.with_feedback("only 2024");

        assert_eq!(original.business_context, "solar sector");
        assert_eq!(
            updated.business_context,
            "solar sector\nUser feedback: only 2024"
        );
        assert_eq!(updated.objective, original.objective);
    }
}
