//! Dataset loading and cleaning.
//!
//! Both tools snapshot the dataset they produce under the run's output
//! directory and return the snapshot path, which `restore` reads back.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::context::{Dataset, RunContext};
use crate::core::types::{Params, Payload};
use crate::io::config::Settings;
use crate::tools::{Tool, param_str, param_usize, payload_path, step_output_path, write_output};

/// Reads a JSON array of records into `context.dataset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadRecords;

impl Tool for LoadRecords {
    fn invoke(
        &self,
        settings: &Settings,
        context: &mut RunContext,
        params: &Params,
    ) -> Result<Payload> {
        let source = param_str(params, "path")
            .map(PathBuf::from)
            .unwrap_or_else(|| settings.planner.default_dataset.clone());
        let limit = param_usize(params, "limit")?
            .unwrap_or(settings.tools.max_rows)
            .min(settings.tools.max_rows);

        let mut dataset = read_dataset(&source)?;
        dataset.records.truncate(limit);
        debug!(source = %source.display(), rows = dataset.len(), "loaded records");

        let snapshot = step_output_path(settings, context, "raw.json");
        write_dataset(&snapshot, &dataset)?;

        let rows = dataset.len();
        context.dataset = Some(dataset);
        context.add_artifact(&snapshot);
        Ok(snapshot_payload(rows, &snapshot, None))
    }

    fn restore(
        &self,
        _settings: &Settings,
        context: &mut RunContext,
        payload: &Payload,
    ) -> Result<()> {
        restore_snapshot(context, payload)
    }

    fn description(&self) -> &str {
        "load a JSON array of records (params: path, limit)"
    }
}

/// Drops duplicate records and fills null cells forward then backward per column.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataClean;

impl Tool for DataClean {
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

        let (cleaned, removed) = clean(dataset);
        debug!(rows = cleaned.len(), removed, "cleaned records");

        let snapshot = step_output_path(settings, context, "clean.json");
        write_dataset(&snapshot, &cleaned)?;

        let rows = cleaned.len();
        context.dataset = Some(cleaned);
        context.add_artifact(&snapshot);
        Ok(snapshot_payload(rows, &snapshot, Some(removed)))
    }

    fn restore(
        &self,
        _settings: &Settings,
        context: &mut RunContext,
        payload: &Payload,
    ) -> Result<()> {
        restore_snapshot(context, payload)
    }

    fn description(&self) -> &str {
        "deduplicate records and fill missing values"
    }
}

/// Returns the cleaned dataset and the number of duplicate records removed.
pub fn clean(dataset: &Dataset) -> (Dataset, usize) {
    let mut seen = HashSet::new();
    let mut records: Vec<Map<String, Value>> = Vec::with_capacity(dataset.len());
    for record in &dataset.records {
        // Map is ordered, so the serialized form is a stable key.
        let key = Value::Object(record.clone()).to_string();
        if seen.insert(key) {
            records.push(record.clone());
        }
    }
    let removed = dataset.len() - records.len();

    for column in dataset.columns() {
        fill_column(&mut records, &column, false);
        fill_column(&mut records, &column, true);
    }
    (Dataset::new(records), removed)
}

fn fill_column(records: &mut [Map<String, Value>], column: &str, backward: bool) {
    let mut last: Option<Value> = None;
    let mut fill = |record: &mut Map<String, Value>| {
        let current = record.get(column).filter(|value| !value.is_null()).cloned();
        match current {
            Some(value) => last = Some(value),
            None => {
                if let Some(value) = &last {
                    record.insert(column.to_string(), value.clone());
                }
            }
        }
    };
    if backward {
        records.iter_mut().rev().for_each(&mut fill);
    } else {
        records.iter_mut().for_each(&mut fill);
    }
}

pub(crate) fn read_dataset(path: &Path) -> Result<Dataset> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read dataset {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse dataset {}", path.display()))?;
    let Value::Array(items) = value else {
        return Err(anyhow!("dataset {} must be a JSON array", path.display()));
    };
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(record) => records.push(record),
            _ => {
                return Err(anyhow!(
                    "dataset {} record {index} is not an object",
                    path.display()
                ));
            }
        }
    }
    Ok(Dataset::new(records))
}

fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(&dataset.records).context("serialize dataset")?;
    buf.push('\n');
    write_output(path, &buf)
}

fn restore_snapshot(context: &mut RunContext, payload: &Payload) -> Result<()> {
    let path = payload_path(payload, "path")?;
    context.dataset = Some(read_dataset(&path)?);
    context.add_artifact(path);
    Ok(())
}

fn snapshot_payload(rows: usize, path: &Path, removed: Option<usize>) -> Payload {
    let mut payload = Payload::new();
    payload.insert("rows".to_string(), json!(rows));
    if let Some(removed) = removed {
        payload.insert("removed".to_string(), json!(removed));
    }
    payload.insert("path".to_string(), json!(path.display().to_string()));
    payload
}
