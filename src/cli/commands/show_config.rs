//! Implementation of the `coupler show-config` command.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::CouplingConfig;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ShowConfigOutput {
    pub config: CouplingConfig,
}

impl CommandOutput for ShowConfigOutput {
    fn to_human(&self) -> String {
        serde_yaml::to_string(&self.config)
            .unwrap_or_else(|err| format!("# failed to render configuration: {err}"))
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }
}

pub fn execute(config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    output(&ShowConfigOutput { config }, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_output_reflects_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("coupler.yaml");
        fs::write(&path, "max_iterations: 7\nrelaxation_factor: 0.7\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        let yaml = ShowConfigOutput { config }.to_human();
        assert!(yaml.contains("max_iterations: 7"));
        assert!(yaml.contains("relaxation_factor: 0.7"));
        assert!(yaml.contains("acceleration: direct"));

        let reparsed: CouplingConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed.max_iterations, 7);
    }
}
