use anyhow::Result;

use crate::core::context::RunContext;
use crate::core::types::{Params, Payload};
use crate::io::config::Settings;
use crate::tools::Tool;

/// Returns its parameters unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Tool for Echo {
    fn invoke(
        &self,
        _settings: &Settings,
        _context: &mut RunContext,
        params: &Params,
    ) -> Result<Payload> {
        Ok(params.clone())
    }

    fn description(&self) -> &str {
        "return the step parameters as the payload"
    }
}
