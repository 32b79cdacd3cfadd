//! Tool abstraction and the name → tool registry.
//!
//! The [`Tool`] trait decouples the engine from whatever a step actually does
//! (query a database, clean a dataset, render a report). Tests register
//! scripted tools that return predetermined payloads.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::core::context::RunContext;
use crate::core::types::{Params, Payload, PlanStep};
use crate::error::EngineError;
use crate::io::config::Settings;

pub mod describe;
pub mod echo;
pub mod records;
pub mod report;

/// A named operation the engine invokes for a plan step.
pub trait Tool: Send + Sync {
    /// Run the tool. The returned payload is persisted as the step's result.
    fn invoke(&self, settings: &Settings, context: &mut RunContext, params: &Params)
    -> Result<Payload>;

    /// Rebuild the context fields this tool owns from a payload it returned earlier.
    ///
    /// Called for steps skipped on resume. Tools that write no context keep the
    /// default no-op.
    fn restore(
        &self,
        _settings: &Settings,
        _context: &mut RunContext,
        _payload: &Payload,
    ) -> Result<()> {
        Ok(())
    }

    fn description(&self) -> &str {
        ""
    }
}

/// Mapping from tool name to implementation. Built once, read-only during runs.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the tool registered under `name`; returns the replaced tool.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        tool: impl Tool + 'static,
    ) -> Option<Arc<dyn Tool>> {
        self.register_arc(name, Arc::new(tool))
    }

    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        tool: Arc<dyn Tool>,
    ) -> Option<Arc<dyn Tool>> {
        self.tools.insert(name.into(), tool)
    }

    /// Look up a tool; fails with [`EngineError::ToolNotFound`].
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.find(name).ok_or_else(|| {
            EngineError::ToolNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn all(&self) -> &BTreeMap<String, Arc<dyn Tool>> {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Fail with [`EngineError::ToolNotFound`] for the first step naming an unknown tool.
    pub fn ensure_known<'a>(&self, steps: impl IntoIterator<Item = &'a PlanStep>) -> Result<()> {
        for step in steps {
            if !self.tools.contains_key(&step.tool) {
                return Err(EngineError::ToolNotFound {
                    name: step.tool.clone(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register("echo", echo::Echo);
    registry.register("load_records", records::LoadRecords);
    registry.register("data_clean", records::DataClean);
    registry.register("describe", describe::Describe);
    registry.register("report", report::Report);
    registry
}

pub(crate) fn param_str<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub(crate) fn param_usize(params: &Params, key: &str) -> Result<Option<usize>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| anyhow!("parameter '{key}' must be a non-negative integer")),
    }
}

/// Path a tool recorded in its payload under `key`.
pub(crate) fn payload_path(payload: &Payload, key: &str) -> Result<PathBuf> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("payload has no '{key}' path"))
}

/// Per-step output file: `<output_dir>/<run_id>/<step>.<suffix>`.
pub(crate) fn step_output_path(settings: &Settings, context: &RunContext, suffix: &str) -> PathBuf {
    settings
        .output_dir
        .join(&context.run_id)
        .join(format!("{}.{suffix}", context.step))
}

pub(crate) fn write_output(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
