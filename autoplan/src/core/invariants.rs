//! Structural invariants for plans and run identifiers.

use std::collections::HashSet;

use crate::core::types::ExecutionPlan;

/// Check structural invariants of an execution plan:
/// - Non-empty, unique step names
/// - Non-empty tool names
///
/// Returns every violation found (empty when the plan is valid).
pub fn validate_plan(plan: &ExecutionPlan) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    for (index, step) in plan.steps.iter().enumerate() {
        let name = step.name.trim();
        if name.is_empty() {
            errors.push(format!("steps[{index}]: name must not be empty"));
        } else if !seen.insert(name) {
            errors.push(format!("steps[{index}]: duplicate step name '{name}'"));
        }
        if step.tool.trim().is_empty() {
            errors.push(format!("steps[{index}] '{name}': tool must not be empty"));
        }
    }
    errors
}

/// Check a run identifier is usable as a single path component (`[A-Za-z0-9._-]`).
pub fn validate_run_id(run_id: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if run_id.is_empty() {
        errors.push("run id must not be empty".to_string());
        return errors;
    }
    if run_id == "." || run_id == ".." {
        errors.push(format!("run id must not be '{run_id}'"));
    }
    if run_id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        errors.push(format!("run id must be [A-Za-z0-9._-] only (got '{run_id}')"));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlanStep;

    fn plan(steps: Vec<PlanStep>) -> ExecutionPlan {
        ExecutionPlan {
            summary: "t".to_string(),
            steps,
        }
    }

    #[test]
    fn valid_plan_has_no_errors() {
        let plan = plan(vec![PlanStep::new("a", "echo"), PlanStep::new("b", "echo")]);
        assert!(validate_plan(&plan).is_empty());
    }

    #[test]
    fn reports_duplicate_names_and_empty_tools() {
        let plan = plan(vec![
            PlanStep::new("dup", "echo"),
            PlanStep::new("dup", ""),
            PlanStep::new(" ", "echo"),
        ]);

        let errors = validate_plan(&plan);
        assert!(errors.iter().any(|err| err.contains("duplicate step name 'dup'")));
        assert!(errors.iter().any(|err| err.contains("tool must not be empty")));
        assert!(errors.iter().any(|err| err.contains("name must not be empty")));
    }

    #[test]
    fn empty_plan_is_valid() {
        assert!(validate_plan(&plan(Vec::new())).is_empty());
    }

    #[test]
    fn run_id_rejects_path_separators() {
        assert!(validate_run_id("run-20240101-000000").is_empty());
        assert!(!validate_run_id("bad/id").is_empty());
        assert!(!validate_run_id("..").is_empty());
        assert!(!validate_run_id("").is_empty());
    }
}
