use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use minijinja::{Environment, context};
use serde_json::json;
use tracing::debug;

use crate::core::context::RunContext;
use crate::core::types::{Params, Payload};
use crate::io::config::Settings;
use crate::tools::{Tool, param_str, payload_path, step_output_path, write_output};

const REPORT_TEMPLATE: &str = include_str!("templates/report.md");

/// Renders a Markdown report from the understanding, summary and artifacts.
///
/// The template comes from the `template_path` parameter, then
/// `[tools] report_template`, then the built-in one.
#[derive(Debug, Clone, Copy, Default)]
pub struct Report;

impl Tool for Report {
    fn invoke(
        &self,
        settings: &Settings,
        context: &mut RunContext,
        params: &Params,
    ) -> Result<Payload> {
        let template_path = param_str(params, "template_path")
            .map(PathBuf::from)
            .or_else(|| settings.tools.report_template.clone());
        let source = match &template_path {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("read report template {}", path.display()))?,
            None => REPORT_TEMPLATE.to_string(),
        };

        let markdown = render_report(&source, context)?;
        let path = step_output_path(settings, context, "report.md");
        write_output(&path, &markdown)?;
        debug!(path = %path.display(), "report written");

        context.add_artifact(&path);
        let mut payload = Payload::new();
        payload.insert("markdown".to_string(), json!(path.display().to_string()));
        Ok(payload)
    }

    fn restore(
        &self,
        _settings: &Settings,
        context: &mut RunContext,
        payload: &Payload,
    ) -> Result<()> {
        context.add_artifact(payload_path(payload, "markdown")?);
        Ok(())
    }

    fn description(&self) -> &str {
        "render a Markdown report (params: template_path)"
    }
}

pub fn render_report(source: &str, context: &RunContext) -> Result<String> {
    let artifacts: Vec<String> = context
        .artifacts
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    let env = Environment::new();
    env.render_str(
        source,
        context! {
            run_id => &context.run_id,
            generated_at => Utc::now().to_rfc3339(),
            understanding => &context.understanding,
            summary => &context.summary,
            artifacts => artifacts,
        },
    )
    .context("render report template")
}
