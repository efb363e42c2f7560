//! Coupler CLI entry point.

use clap::Parser;

use coupler::cli::{commands, handle_error, load_config, Cli, Commands};
use coupler::infrastructure::logging::{LogConfig, LoggerImpl};

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // An unreadable config is reported by the command itself.
    let log_config = load_config(config_path)
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match &cli.command {
        Commands::Run(args) => commands::run::execute(args, config_path, cli.json),
        Commands::Validate => commands::validate::execute(config_path, cli.json),
        Commands::ShowConfig => commands::show_config::execute(config_path, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
