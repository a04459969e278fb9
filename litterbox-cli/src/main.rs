//! `litterbox` binary entry point.

use std::process::ExitCode;

use clap::Parser;

use litterbox_cli::cli::Cli;
use litterbox_cli::commands;
use litterbox_cli::output::OutputWriter;
use litterbox_core::config::{GeneralConfig, LitterboxConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // A broken config still gets logging; the command itself reports the error.
    let mut general = match LitterboxConfig::load(&cli.config).await {
        Ok(config) => config.general,
        Err(_) => GeneralConfig::default(),
    };
    if let Some(level) = cli.log_level.clone() {
        general.log_level = level;
    }
    if let Err(e) = litterbox_engine::logging::init_tracing(&general) {
        eprintln!("warning: {e}");
    }

    tracing::debug!(config = %cli.config.display(), "litterbox starting");

    let writer = OutputWriter::new(cli.output);
    match commands::run(cli.command, &cli.config, &writer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            use colored::Colorize;

            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
