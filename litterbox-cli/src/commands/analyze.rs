//! `litterbox analyze` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use litterbox_core::driver::DriverVerdict;
use litterbox_core::record::{AnalysisJob, TargetRecord};
use litterbox_core::types::{AnalysisType, JobStatus, RiskAssessment, RiskLevel, TargetId};
use litterbox_engine::AnalysisOptions;

use crate::cli::AnalyzeArgs;
use crate::commands::open_engine;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `analyze` command.
///
/// Runs in the foreground; Ctrl-C cancels the job and still reports its
/// final state.
pub async fn execute(
    args: AnalyzeArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let analysis_type: AnalysisType = args.analysis_type.parse().map_err(CliError::Command)?;
    let engine = open_engine(config_path).await?;
    let id = TargetId::new(args.target);
    let options = AnalysisOptions {
        cmd_args: args.cmd_args,
    };

    info!(target_id = %id, analysis = %analysis_type, "starting analysis");
    let analysis = engine.analyze(&id, analysis_type, options);
    tokio::pin!(analysis);
    let job = tokio::select! {
        job = &mut analysis => job?,
        _ = tokio::signal::ctrl_c() => {
            warn!(target_id = %id, "interrupted, cancelling analysis");
            engine.cancel_all().await;
            analysis.await?
        }
    };

    let record = engine.results(&id).await?;
    let report = AnalyzeReport::new(job, &record);
    writer.render(&report)?;

    match (args.fail_on, &report.risk) {
        (Some(threshold), Some(risk)) => check_threshold(risk, threshold.into()),
        _ => Ok(()),
    }
}

/// `Err(RiskyVerdict)` when `risk` is at or above `threshold`.
pub fn check_threshold(risk: &RiskAssessment, threshold: RiskLevel) -> Result<(), CliError> {
    if risk.level >= threshold {
        return Err(CliError::RiskyVerdict {
            score: risk.score,
            level: risk.level,
            threshold,
        });
    }
    Ok(())
}

/// Outcome of one analysis run.
#[derive(Serialize)]
pub struct AnalyzeReport {
    pub job: AnalysisJob,
    /// Combined static/dynamic assessment written by this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_verdict: Option<DriverVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuzzy_matches: Option<usize>,
}

impl AnalyzeReport {
    /// Pick the section this job wrote, if it wrote one.
    pub fn new(job: AnalysisJob, record: &TargetRecord) -> Self {
        let mut report = Self {
            risk: None,
            driver_verdict: None,
            fuzzy_matches: None,
            job,
        };
        let id = report.job.id;
        match report.job.analysis_type {
            AnalysisType::Static => {
                report.risk = record
                    .static_analysis
                    .as_ref()
                    .filter(|s| s.job_id == id)
                    .map(|s| s.risk_assessment.clone());
            }
            AnalysisType::Dynamic => {
                report.risk = record
                    .dynamic
                    .as_ref()
                    .filter(|s| s.job_id == id)
                    .map(|s| s.risk_assessment.clone());
            }
            AnalysisType::HolyGrail => {
                report.driver_verdict = record
                    .holygrail
                    .as_ref()
                    .filter(|s| s.job_id == id)
                    .map(|s| s.assessment.verdict);
            }
            AnalysisType::Fuzzy => {
                report.fuzzy_matches = record
                    .fuzzy
                    .as_ref()
                    .filter(|s| s.job_id == id)
                    .map(|s| s.matches.len());
            }
            AnalysisType::Blender => {}
        }
        report
    }
}

impl Render for AnalyzeReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let status = self.job.status.to_string();
        let status = match self.job.status {
            JobStatus::Completed => status.green().bold(),
            JobStatus::Partial => status.yellow().bold(),
            JobStatus::Failed => status.red().bold(),
            _ => status.dimmed(),
        };
        writeln!(
            w,
            "{} analysis of {}: {}",
            self.job.analysis_type, self.job.target_id, status
        )?;
        writeln!(w, "  Job: {}", self.job.id)?;
        if let Some(message) = &self.job.message {
            writeln!(w, "  Note: {message}")?;
        }

        if let Some(risk) = &self.risk {
            writeln!(w, "  Risk: {}", colored_risk(risk.score, risk.level))?;
            for factor in &risk.factors {
                writeln!(w, "    - {factor}")?;
            }
        }
        if let Some(verdict) = self.driver_verdict {
            writeln!(w, "  Verdict: {}", verdict.to_string().bold())?;
        }
        if let Some(n) = self.fuzzy_matches {
            writeln!(w, "  Similar references: {n}")?;
        }
        Ok(())
    }
}

/// `"<score> (<level>)"`, coloured by level.
pub fn colored_risk(score: u8, level: RiskLevel) -> colored::ColoredString {
    use colored::Colorize;

    let text = format!("{score} ({level})");
    match level {
        RiskLevel::Critical => text.red().bold(),
        RiskLevel::High => text.red(),
        RiskLevel::Medium => text.yellow(),
        RiskLevel::Low => text.green(),
    }
}
