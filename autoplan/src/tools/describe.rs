use std::fs;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::context::{ColumnSummary, Dataset, DatasetSummary, RunContext};
use crate::core::types::{Params, Payload};
use crate::io::config::Settings;
use crate::tools::{Tool, payload_path, step_output_path, write_output};

/// Descriptive statistics for every numeric column of `context.dataset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Describe;

impl Tool for Describe {
    fn invoke(
        &self,
        settings: &Settings,
        context: &mut RunContext,
        _params: &Params,
    ) -> Result<Payload> {
        let dataset = context
            .dataset
            .as_ref()
            .ok_or_else(|| anyhow!("no dataset in context; load records first"))?;
        let summary = summarize(dataset);
        debug!(
            rows = summary.rows,
            numeric = summary.numeric.len(),
            "described dataset"
        );

        let path = step_output_path(settings, context, "summary.json");
        let mut buf = serde_json::to_string_pretty(&summary).context("serialize summary")?;
        buf.push('\n');
        write_output(&path, &buf)?;

        let mut payload = Payload::new();
        payload.insert("columns".to_string(), json!(summary.columns));
        payload.insert("path".to_string(), json!(path.display().to_string()));
        context.summary = Some(summary);
        context.add_artifact(path);
        Ok(payload)
    }

    fn restore(
        &self,
        _settings: &Settings,
        context: &mut RunContext,
        payload: &Payload,
    ) -> Result<()> {
        let path = payload_path(payload, "path")?;
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read summary {}", path.display()))?;
        let summary: DatasetSummary = serde_json::from_str(&contents)
            .with_context(|| format!("parse summary {}", path.display()))?;
        context.summary = Some(summary);
        context.add_artifact(path);
        Ok(())
    }

    fn description(&self) -> &str {
        "count/mean/min/max/std for numeric columns"
    }
}

/// A column is numeric when it has at least one number and no other non-null values.
pub fn summarize(dataset: &Dataset) -> DatasetSummary {
    let columns = dataset.columns();
    let mut numeric = Vec::new();
    'columns: for column in &columns {
        let mut values = Vec::new();
        for record in &dataset.records {
            match record.get(column) {
                None | Some(Value::Null) => {}
                Some(Value::Number(n)) => {
                    if let Some(v) = n.as_f64() {
                        values.push(v);
                    }
                }
                Some(_) => continue 'columns,
            }
        }
        if let Some(stats) = column_stats(column, &values) {
            numeric.push(stats);
        }
    }
    DatasetSummary {
        rows: dataset.len(),
        columns,
        numeric,
    }
}

fn column_stats(column: &str, values: &[f64]) -> Option<ColumnSummary> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let n = count as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Sample standard deviation; a single value has no spread.
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        var.sqrt()
    } else {
        0.0
    };
    Some(ColumnSummary {
        column: column.to_string(),
        count,
        mean,
        min,
        max,
        std,
    })
}
