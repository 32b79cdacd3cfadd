//! Test-only tools, plans and engines with deterministic behavior.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::context::RunContext;
use crate::core::types::{ExecutionPlan, Params, Payload, PlanStep};
use crate::engine::Engine;
use crate::io::config::Settings;
use crate::tools::{Tool, ToolRegistry};

/// Returns a fixed payload on every call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTool {
    payload: Payload,
}

impl ScriptedTool {
    pub fn new(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Payload::new(),
        };
        Self { payload }
    }
}

impl Tool for ScriptedTool {
    fn invoke(&self, _: &Settings, _: &mut RunContext, _: &Params) -> Result<Payload> {
        Ok(self.payload.clone())
    }
}

/// Always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Tool for FailingTool {
    fn invoke(&self, _: &Settings, _: &mut RunContext, _: &Params) -> Result<Payload> {
        Err(anyhow!("{}", self.message))
    }
}

/// Counts invocations and restores; optionally fails the first `fail_times` calls.
///
/// Clones share counters, so a test can keep one handle and register another.
#[derive(Debug, Clone, Default)]
pub struct CountingTool {
    calls: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
    fail_times: usize,
}

impl CountingTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(fail_times: usize) -> Self {
        Self {
            fail_times,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

impl Tool for CountingTool {
    fn invoke(&self, _: &Settings, context: &mut RunContext, _: &Params) -> Result<Payload> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            return Err(anyhow!("scripted failure {call}"));
        }
        context.add_artifact(format!("{}.out", context.step));
        let mut payload = Payload::new();
        payload.insert("call".to_string(), call.into());
        Ok(payload)
    }

    fn restore(&self, _: &Settings, context: &mut RunContext, _: &Payload) -> Result<()> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        context.add_artifact(format!("{}.out", context.step));
        Ok(())
    }
}

/// Plan with one step per `(name, tool)` pair, in order.
pub fn echo_plan(steps: &[(&str, &str)]) -> ExecutionPlan {
    ExecutionPlan {
        summary: "test plan".to_string(),
        steps: steps
            .iter()
            .map(|(name, tool)| PlanStep::new(*name, *tool))
            .collect(),
    }
}

/// Engine over a fresh temp directory. Keep the `TempDir` alive for the test.
pub fn engine_with(registry: ToolRegistry) -> (tempfile::TempDir, Engine) {
    let temp = tempfile::tempdir().expect("tempdir");
    let engine = Engine::from_settings(Settings::rooted(temp.path()), registry);
    (temp, engine)
}

/// Small dataset with one duplicate row and one null cell.
pub fn write_sample_records(dir: &Path) -> PathBuf {
    let path = dir.join("records.json");
    let records = serde_json::json!([
        {"company": "a", "region": "north", "revenue": 120.0, "year": 2022},
        {"company": "b", "region": null, "revenue": 80.0, "year": 2022},
        {"company": "b", "region": null, "revenue": 80.0, "year": 2022},
        {"company": "c", "region": "south", "revenue": 100.0, "year": 2023},
    ]);
    std::fs::write(&path, records.to_string()).expect("write sample records");
    path
}
