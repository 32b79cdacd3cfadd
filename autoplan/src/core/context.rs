//! Typed in-memory context shared by the steps of one engine invocation.
//!
//! The context is never persisted as a whole. Tools that populate a field also
//! persist whatever they need to rebuild it and record its location in their
//! step payload, so a resumed run can restore the field for skipped steps.
//!
//! Field ownership for the built-in tools:
//!
//! | field           | written by                    | read by                      |
//! |-----------------|-------------------------------|------------------------------|
//! | `step`          | engine                        | file-producing tools         |
//! | `understanding` | engine                        | `report`                     |
//! | `dataset`       | `load_records`, `data_clean`  | `data_clean`, `describe`     |
//! | `summary`       | `describe`                    | `report`                     |
//! | `artifacts`     | every file-producing tool     | `report`                     |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::types::TaskUnderstanding;

/// Layout version of [`RunContext`]. Bump when fields change meaning.
pub const CONTEXT_VERSION: u32 = 1;

/// Tabular dataset as an ordered list of JSON records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub records: Vec<Map<String, Value>>,
}

impl Dataset {
    pub fn new(records: Vec<Map<String, Value>>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Column names in order of first appearance across records.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.iter().any(|existing| existing == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }
}

/// Descriptive statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std: f64,
}

/// Output of the `describe` tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub rows: usize,
    pub columns: Vec<String>,
    pub numeric: Vec<ColumnSummary>,
}

/// Mutable context threaded through every tool invocation of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub version: u32,
    pub run_id: String,
    /// Name of the step currently being invoked or restored. Set by the engine.
    pub step: String,
    pub understanding: TaskUnderstanding,
    pub dataset: Option<Dataset>,
    pub summary: Option<DatasetSummary>,
    pub artifacts: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, understanding: TaskUnderstanding) -> Self {
        Self {
            version: CONTEXT_VERSION,
            run_id: run_id.into(),
            step: String::new(),
            understanding,
            dataset: None,
            summary: None,
            artifacts: Vec::new(),
        }
    }

    /// Record a produced file once, keeping first-seen order.
    pub fn add_artifact(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }
}
