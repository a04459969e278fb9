//! `litterbox results` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use litterbox_core::record::TargetRecord;
use litterbox_core::types::{AnalysisType, ScannerResult, ScannerStatus, TargetId};
use litterbox_risk::{ScanResults, detection_counts};

use crate::cli::ResultsArgs;
use crate::commands::analyze::colored_risk;
use crate::commands::open_engine;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `results` command.
pub async fn execute(
    args: ResultsArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let only = args
        .analysis_type
        .as_deref()
        .map(str::parse::<AnalysisType>)
        .transpose()
        .map_err(CliError::Command)?;

    let engine = open_engine(config_path).await?;
    let record = engine.results(&TargetId::new(args.target)).await?;
    writer.render(&ResultsReport::new(record, only)?)
}

/// Record key of a section, `None` for types that never store results.
fn section_key(analysis_type: AnalysisType) -> Option<&'static str> {
    match analysis_type {
        AnalysisType::Static => Some("static"),
        AnalysisType::Dynamic => Some("dynamic"),
        AnalysisType::HolyGrail => Some("holygrail"),
        AnalysisType::Fuzzy => Some("fuzzy"),
        AnalysisType::Blender => None,
    }
}

/// A stored record, optionally narrowed to one section.
///
/// JSON output is the record itself (or `target`, `jobs` and the one
/// section); text output is a summary.
#[derive(Serialize)]
pub struct ResultsReport {
    #[serde(flatten)]
    body: Map<String, Value>,
    #[serde(skip)]
    record: TargetRecord,
    #[serde(skip)]
    only: Option<AnalysisType>,
}

impl ResultsReport {
    pub fn new(record: TargetRecord, only: Option<AnalysisType>) -> Result<Self, CliError> {
        let Value::Object(mut body) = serde_json::to_value(&record)? else {
            return Err(CliError::Command("record did not serialize to an object".to_owned()));
        };

        if let Some(analysis_type) = only {
            let key = section_key(analysis_type).ok_or_else(|| {
                CliError::Command(format!("{analysis_type} analysis does not store results"))
            })?;
            let section = body.remove(key).ok_or_else(|| {
                CliError::NotFound(format!(
                    "no {analysis_type} results for target {}",
                    record.target.id
                ))
            })?;
            body.retain(|k, _| k == "target" || k == "jobs");
            body.insert(key.to_owned(), section);
        }

        Ok(Self { body, record, only })
    }

    fn shows(&self, analysis_type: AnalysisType) -> bool {
        self.only.is_none_or(|t| t == analysis_type)
    }
}

impl Render for ResultsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let r = &self.record;
        writeln!(w, "Target {} ({})", r.target.name.bold(), r.target.id)?;
        writeln!(w, "  Category: {}", r.target.category)?;

        writeln!(w)?;
        writeln!(w, "Jobs:")?;
        for job in r.jobs.iter().filter(|j| self.shows(j.analysis_type)) {
            writeln!(
                w,
                "  {:<10} {:<10} {}  {}",
                job.analysis_type.to_string(),
                job.status.to_string(),
                job.started_at.format("%Y-%m-%d %H:%M:%S"),
                job.message.as_deref().unwrap_or("")
            )?;
        }

        if let Some(s) = r.static_analysis.as_ref().filter(|_| self.shows(AnalysisType::Static)) {
            writeln!(w)?;
            writeln!(
                w,
                "{} risk {}",
                "[static]".bold(),
                colored_risk(s.risk_assessment.score, s.risk_assessment.level)
            )?;
            render_factors(w, &s.risk_assessment.factors)?;
            render_scanners(w, &s.results)?;
            render_counts(w, &s.results)?;
        }

        if let Some(d) = r.dynamic.as_ref().filter(|_| self.shows(AnalysisType::Dynamic)) {
            writeln!(w)?;
            writeln!(
                w,
                "{} risk {}",
                "[dynamic]".bold(),
                colored_risk(d.risk_assessment.score, d.risk_assessment.level)
            )?;
            let m = &d.metadata;
            writeln!(
                w,
                "  pid={} attached={} early_termination={} duration={:.2}s",
                m.pid.map_or_else(|| "-".to_owned(), |p| p.to_string()),
                m.attached,
                m.early_termination,
                m.total_duration_secs
            )?;
            if let Some(note) = &m.termination_note {
                writeln!(w, "  {note}")?;
            }
            render_factors(w, &d.risk_assessment.factors)?;
            render_scanners(w, &d.results)?;
            render_counts(w, &d.results)?;
        }

        if let Some(h) = r.holygrail.as_ref().filter(|_| self.shows(AnalysisType::HolyGrail)) {
            let a = &h.assessment;
            let f = &a.byovd_findings;
            writeln!(w)?;
            writeln!(
                w,
                "{} {} score {} ({})",
                "[holygrail]".bold(),
                a.verdict.to_string().bold(),
                a.score,
                a.label
            )?;
            writeln!(
                w,
                "  loldriver={} win10_blocked={} win11_blocked={}",
                f.is_loldriver, f.is_win10_blocked, f.is_win11_blocked
            )?;
            if !f.critical_imports.is_empty() {
                writeln!(w, "  critical imports: {}", f.critical_imports.join(", ").red())?;
            }
        }

        if let Some(z) = r.fuzzy.as_ref().filter(|_| self.shows(AnalysisType::Fuzzy)) {
            writeln!(w)?;
            writeln!(w, "{} threshold {:.1}%", "[fuzzy]".bold(), z.threshold)?;
            if z.matches.is_empty() {
                writeln!(w, "  no similar references")?;
            }
            for m in &z.matches {
                writeln!(
                    w,
                    "  {:>6.2}%  {:>5}/{:<5} {}",
                    m.similarity, m.matching_blocks, m.total_blocks, m.reference
                )?;
            }
        }

        Ok(())
    }
}

fn render_factors(w: &mut dyn Write, factors: &[String]) -> std::io::Result<()> {
    for factor in factors {
        writeln!(w, "  - {factor}")?;
    }
    Ok(())
}

fn render_scanners(w: &mut dyn Write, results: &BTreeMap<String, ScannerResult>) -> std::io::Result<()> {
    use colored::Colorize;

    for (name, result) in results {
        let status = result.status.to_string();
        let status = match result.status {
            ScannerStatus::Success => status.green(),
            ScannerStatus::Skipped => status.dimmed(),
            ScannerStatus::Error | ScannerStatus::Timeout => status.red(),
        };
        write!(w, "  {:<14} {:<8}", name, status)?;
        if !result.detections.is_empty() {
            write!(w, " {} detection(s)", result.detections.len())?;
        }
        if let Some(message) = &result.message {
            write!(w, " {}", message.dimmed())?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn render_counts(w: &mut dyn Write, results: &ScanResults) -> std::io::Result<()> {
    let counts = detection_counts(results);
    if counts.total() == 0 {
        return Ok(());
    }
    let per_tool = [
        ("yara", counts.yara as u64),
        ("pe_sieve", counts.pesieve),
        ("moneta", counts.moneta),
        ("patriot", counts.patriot as u64),
        ("hsb", counts.hsb as u64),
        ("rededr", counts.rededr as u64),
    ];
    let parts: Vec<String> = per_tool
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(name, n)| format!("{name} {n}"))
        .collect();
    writeln!(w, "  Detections: {} ({})", counts.total(), parts.join(", "))
}
