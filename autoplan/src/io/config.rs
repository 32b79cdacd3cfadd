//! Settings stored in `autoplan.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Immutable configuration threaded through every engine and tool call.
///
/// This file is intended to be edited by humans. Missing fields default to
/// values that work from the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one `<run_id>.json` document per run.
    pub state_dir: PathBuf,

    /// Directory where tools write datasets, summaries and reports.
    pub output_dir: PathBuf,

    /// Optional file that receives a copy of the tracing output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    pub planner: PlannerSettings,

    pub tools: ToolSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerSettings {
    /// Dataset the offline planner's load step reads when no path is given.
    pub default_dataset: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolSettings {
    /// Upper bound on records loaded by `load_records`.
    pub max_rows: usize,

    /// Markdown template used by `report` instead of the built-in one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_template: Option<PathBuf>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            default_dataset: PathBuf::from("data/records.json"),
        }
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            report_template: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".autoplan/state"),
            output_dir: PathBuf::from(".autoplan/outputs"),
            log_file: None,
            planner: PlannerSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

impl Settings {
    /// Settings rooted under `root` (state and outputs in `root/.autoplan`).
    pub fn rooted(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            state_dir: root.join(defaults.state_dir),
            output_dir: root.join(defaults.output_dir),
            ..defaults
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must not be empty"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(anyhow!("output_dir must not be empty"));
        }
        if self.tools.max_rows == 0 {
            return Err(anyhow!("tools.max_rows must be > 0"));
        }
        Ok(())
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `Settings::default()`.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        let settings = Settings::default();
        settings.validate()?;
        return Ok(settings);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let settings = load_settings(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn full_file_overrides_every_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autoplan.toml");
        fs::write(
            &path,
            r#"state_dir = "s"
output_dir = "o"
log_file = "agent.log"

[planner]
default_dataset = "d.json"

[tools]
max_rows = 50
report_template = "r.md"
"#,
        )
        .expect("write");

        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.state_dir, PathBuf::from("s"));
        assert_eq!(settings.output_dir, PathBuf::from("o"));
        assert_eq!(settings.log_file, Some(PathBuf::from("agent.log")));
        assert_eq!(settings.planner.default_dataset, PathBuf::from("d.json"));
        assert_eq!(settings.tools.max_rows, 50);
        assert_eq!(settings.tools.report_template, Some(PathBuf::from("r.md")));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autoplan.toml");
        fs::write(&path, "output_dir = \"out\"\n\n[tools]\nmax_rows = 5\n").expect("write");

        let settings = load_settings(&path).expect("load");
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert_eq!(settings.tools.max_rows, 5);
        assert_eq!(settings.state_dir, Settings::default().state_dir);
        assert_eq!(settings.planner, PlannerSettings::default());
    }

    #[test]
    fn zero_max_rows_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("autoplan.toml");
        fs::write(&path, "[tools]\nmax_rows = 0\n").expect("write");

        let err = load_settings(&path).unwrap_err();
        assert!(err.to_string().contains("max_rows"));
    }
}
