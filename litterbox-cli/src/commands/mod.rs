//! Command handlers -- one module per subcommand

pub mod analyze;
pub mod config;
pub mod fuzzy_db;
pub mod health;
pub mod results;
pub mod targets;

use std::path::Path;

use litterbox_engine::Orchestrator;

use crate::cli::Commands;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Dispatch a parsed subcommand.
pub async fn run(
    command: Commands,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match command {
        Commands::Upload(args) => targets::upload(args, config_path, writer).await,
        Commands::RegisterProcess(args) => {
            targets::register_process(args, config_path, writer).await
        }
        Commands::Analyze(args) => analyze::execute(args, config_path, writer).await,
        Commands::Results(args) => results::execute(args, config_path, writer).await,
        Commands::List => targets::list(config_path, writer).await,
        Commands::Delete(args) => targets::delete(args, config_path, writer).await,
        Commands::Cleanup => targets::cleanup(config_path, writer).await,
        Commands::Health => health::execute(config_path, writer).await,
        Commands::FuzzyDb(args) => fuzzy_db::execute(args, config_path, writer).await,
        Commands::Config(args) => config::execute(args, config_path, writer).await,
    }
}

/// Load the config and open the engine over the file-backed store.
pub async fn open_engine(config_path: &Path) -> Result<Orchestrator, CliError> {
    Ok(Orchestrator::open(config_path).await?)
}
