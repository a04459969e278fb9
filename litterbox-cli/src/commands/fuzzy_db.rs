//! `litterbox fuzzy-db` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::cli::{FuzzyDbAction, FuzzyDbArgs};
use crate::commands::open_engine;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

pub async fn execute(
    args: FuzzyDbArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        FuzzyDbAction::Build { dir } => {
            if !dir.is_dir() {
                return Err(CliError::Command(format!(
                    "not a directory: {}",
                    dir.display()
                )));
            }
            let engine = open_engine(config_path).await?;
            info!(dir = %dir.display(), "building fuzzy database");
            let db = engine.build_fuzzy_db(&dir).await?;
            writer.render(&FuzzyDbReport {
                path: engine.config().fuzzy_db_path().display().to_string(),
                source: dir.display().to_string(),
                block_size: db.block_size,
                references: db.references.len(),
            })
        }
    }
}

#[derive(Serialize)]
pub struct FuzzyDbReport {
    pub path: String,
    pub source: String,
    pub block_size: usize,
    pub references: usize,
}

impl Render for FuzzyDbReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "Fuzzy database {} built from {}",
            self.path.bold(),
            self.source
        )?;
        writeln!(w, "  References: {}", self.references)?;
        writeln!(w, "  Block size: {} bytes", self.block_size)?;
        Ok(())
    }
}
