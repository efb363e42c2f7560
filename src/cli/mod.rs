//! Command-line interface for the `coupler` binary.

pub mod commands;
pub mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::domain::models::CouplingConfig;
use crate::infrastructure::config::ConfigLoader;

#[derive(Parser, Debug)]
#[command(name = "coupler")]
#[command(about = "Coupler - fixed-point coupling engine for multiphysics solves", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file (defaults to coupler.yaml and coupler.local.yaml in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the built-in two-unit demo problem
    Run(commands::run::RunArgs),

    /// Check a configuration without running anything
    Validate,

    /// Print the effective merged configuration
    ShowConfig,
}

/// Load the configuration from `path`, or from the working directory when unset.
pub fn load_config(path: Option<&Path>) -> Result<CouplingConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Print `err` in the requested format and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1)
}
