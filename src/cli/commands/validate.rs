//! Implementation of the `coupler validate` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::CouplingConfig;

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    pub success: bool,
    pub source: String,
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub acceleration: String,
    pub transformed_quantities: usize,
    pub custom_postprocessor: Option<String>,
}

impl ValidateOutput {
    fn new(config: &CouplingConfig, source: String) -> Self {
        Self {
            success: true,
            source,
            min_iterations: config.min_iterations,
            max_iterations: config.max_iterations,
            acceleration: format!("{:?}", config.acceleration).to_lowercase(),
            transformed_quantities: config.quantity_names().count(),
            custom_postprocessor: config.custom_postprocessor.clone(),
        }
    }
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Configuration is valid ({})", self.source),
            format!("  iterations:   {}..={}", self.min_iterations, self.max_iterations),
            format!("  acceleration: {}", self.acceleration),
            format!("  transformed:  {} quantities", self.transformed_quantities),
        ];
        if let Some(name) = &self.custom_postprocessor {
            lines.push(format!("  custom check: {name}"));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let result = validate(config_path)?;
    output(&result, json_mode);
    Ok(())
}

pub fn validate(config_path: Option<&Path>) -> Result<ValidateOutput> {
    let source = config_path.map_or_else(
        || "working directory".to_string(),
        |path| path.display().to_string(),
    );
    let config = load_config(config_path)
        .with_context(|| format!("Configuration from {source} is invalid"))?;
    Ok(ValidateOutput::new(&config, source))
}
