//! `litterbox upload | register-process | list | delete | cleanup`

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use litterbox_core::target::AnalysisTarget;
use litterbox_core::types::TargetId;
use litterbox_risk::entropy_risk;
use litterbox_store::{Registration, TargetSummary};

use crate::cli::{DeleteArgs, RegisterProcessArgs, UploadArgs};
use crate::commands::open_engine;
use crate::error::CliError;
use crate::output::{OutputWriter, Render, short_id};

pub async fn upload(
    args: UploadArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    let registration = engine.upload_path(&args.path).await?;
    info!(target_id = %registration.target.id, created = registration.created, "uploaded");
    writer.render(&TargetReport::from(registration))
}

pub async fn register_process(
    args: RegisterProcessArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    let registration = engine.register_process(args.pid).await?;
    writer.render(&TargetReport::from(registration))
}

pub async fn list(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    let targets = engine.summary().await?;
    writer.render(&TargetList { targets })
}

pub async fn delete(
    args: DeleteArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    let deleted = engine.delete(&TargetId::new(args.target.clone())).await?;
    writer.render(&DeleteReport {
        target_id: args.target,
        deleted,
    })
}

pub async fn cleanup(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let engine = open_engine(config_path).await?;
    let removed = engine.cleanup().await?;
    writer.render(&CleanupReport { removed })
}

/// A registered target and whether this call created it.
#[derive(Serialize)]
pub struct TargetReport {
    #[serde(flatten)]
    pub target: AnalysisTarget,
    pub created: bool,
}

impl From<Registration> for TargetReport {
    fn from(r: Registration) -> Self {
        Self {
            target: r.target,
            created: r.created,
        }
    }
}

impl Render for TargetReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let t = &self.target;
        let state = if self.created {
            "registered".green()
        } else {
            "already registered".yellow()
        };
        writeln!(w, "Target {} ({})", t.id.to_string().bold(), state)?;
        writeln!(w, "  Name:      {}", t.name)?;
        writeln!(w, "  Kind:      {}", t.kind)?;
        if let Some(pid) = t.pid {
            writeln!(w, "  PID:       {pid}")?;
        } else {
            writeln!(w, "  Size:      {} bytes", t.size)?;
        }
        writeln!(w, "  Category:  {} ({})", t.category, t.mime)?;
        if let Some(md5) = &t.md5 {
            writeln!(w, "  MD5:       {md5}")?;
        }
        if let Some(sha256) = &t.sha256 {
            writeln!(w, "  SHA256:    {sha256}")?;
        }
        if let Some(entropy) = t.entropy {
            writeln!(w, "  Entropy:   {entropy:.2} ({})", entropy_risk(entropy))?;
        }
        if let Some(pe) = &t.pe_info {
            writeln!(
                w,
                "  PE:        {} {} subsystem={} sections={} imports={}",
                pe.format,
                pe.machine,
                pe.subsystem,
                pe.sections.len(),
                pe.imports.len()
            )?;
            if !pe.suspicious_imports.is_empty() {
                writeln!(
                    w,
                    "  Suspicious imports: {}",
                    pe.suspicious_imports.len().to_string().red()
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct TargetList {
    pub targets: Vec<TargetSummary>,
}

impl Render for TargetList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.targets.is_empty() {
            writeln!(w, "No targets.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<14} {:<28} {:<16} {:<24} Risk",
            "ID", "Name", "Category", "Analyses"
        )?;
        writeln!(w, "{}", "-".repeat(96))?;

        for t in &self.targets {
            let analyses: Vec<String> = t.analyses.iter().map(ToString::to_string).collect();
            let risk = match (t.risk_score, t.risk_level, t.driver_verdict) {
                (Some(score), Some(level), _) => format!("{score} ({level})"),
                (_, _, Some(verdict)) => verdict.to_string(),
                _ => "-".to_owned(),
            };
            writeln!(
                w,
                "{:<14} {:<28} {:<16} {:<24} {}",
                short_id(t.id.as_str()),
                truncate(&t.name, 28),
                t.category.to_string(),
                analyses.join(","),
                risk.bold()
            )?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct DeleteReport {
    pub target_id: String,
    pub deleted: bool,
}

impl Render for DeleteReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.deleted {
            writeln!(w, "Deleted {}", self.target_id)
        } else {
            writeln!(w, "Nothing to delete for {}", self.target_id)
        }
    }
}

#[derive(Serialize)]
pub struct CleanupReport {
    pub removed: usize,
}

impl Render for CleanupReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Removed {} target(s)", self.removed)
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_owned()
    } else {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
