//! `litterbox health` command handler

use std::io::Write;
use std::path::Path;

use litterbox_core::types::HealthStatus;
use litterbox_engine::EngineHealth;

use crate::commands::open_engine;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `health` command. Reports, never fails on an unhealthy
/// component.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    writer.render(&engine.health())
}

fn colored_status(status: &HealthStatus) -> colored::ColoredString {
    use colored::Colorize;

    match status {
        HealthStatus::Healthy => "healthy".green(),
        HealthStatus::Degraded(_) => "degraded".yellow(),
        HealthStatus::Unhealthy(_) => "unhealthy".red().bold(),
    }
}

impl Render for EngineHealth {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Engine: {}", colored_status(&self.status))?;
        writeln!(w)?;
        writeln!(w, "{:<24} {:<9} {:<10} Details", "Component", "Enabled", "Status")?;
        writeln!(w, "{}", "-".repeat(72))?;

        for c in &self.components {
            let details = match &c.status {
                HealthStatus::Healthy => String::new(),
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => reason.clone(),
            };
            let status = if c.enabled {
                colored_status(&c.status)
            } else {
                "-".dimmed()
            };
            writeln!(
                w,
                "{:<24} {:<9} {:<10} {}",
                c.name,
                if c.enabled { "yes" } else { "no" },
                status,
                details
            )?;
        }
        Ok(())
    }
}
