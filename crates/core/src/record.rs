//! The persisted per-target record.
//!
//! One [`TargetRecord`] per target is the unit of persistence. Each analysis
//! type writes its own section, so a dynamic run never clobbers static
//! results and vice versa.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::ByovdAssessment;
use crate::error::LitterboxError;
use crate::target::AnalysisTarget;
use crate::types::{AnalysisType, JobStatus, RiskAssessment, ScannerResult, TargetId};

/// One triggered analysis of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub target_id: TargetId,
    pub analysis_type: AnalysisType,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnalysisJob {
    /// A new job in `pending`.
    pub fn new(target_id: TargetId, analysis_type: AnalysisType) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            analysis_type,
            status: JobStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            message: None,
        }
    }

    /// Move to `next`, rejecting any backwards transition.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), LitterboxError> {
        if !self.status.can_transition_to(next) {
            return Err(LitterboxError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Results of a static analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticSection {
    pub job_id: Uuid,
    pub results: BTreeMap<String, ScannerResult>,
    pub risk_assessment: RiskAssessment,
}

/// Output the analyzed payload itself wrote while it ran.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub had_output: bool,
    pub output_truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Bookkeeping for a dynamic run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Whether the engine attached to an existing process rather than launching one.
    pub attached: bool,
    pub cmd_args: Vec<String>,
    pub early_termination: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_note: Option<String>,
    pub total_duration_secs: f64,
}

/// Results of a dynamic analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSection {
    pub job_id: Uuid,
    pub results: BTreeMap<String, ScannerResult>,
    pub risk_assessment: RiskAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_output: Option<ProcessOutput>,
    pub metadata: DynamicMetadata,
}

/// Results of a driver (BYOVD) analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolyGrailSection {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub assessment: ByovdAssessment,
    /// Every function the driver imports, for display.
    pub imports: Vec<String>,
}

/// One reference file that shares blocks with the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    pub reference: String,
    /// Percentage of the target's blocks found in the reference.
    pub similarity: f64,
    pub matching_blocks: usize,
    pub total_blocks: usize,
}

/// Results of a fuzzy similarity job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzySection {
    pub job_id: Uuid,
    pub threshold: f64,
    pub matches: Vec<FuzzyMatch>,
}

/// Everything known about one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target: AnalysisTarget,
    #[serde(default)]
    pub jobs: Vec<AnalysisJob>,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_analysis: Option<StaticSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holygrail: Option<HolyGrailSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<FuzzySection>,
}

impl TargetRecord {
    pub fn new(target: AnalysisTarget) -> Self {
        Self {
            target,
            jobs: Vec::new(),
            static_analysis: None,
            dynamic: None,
            holygrail: None,
            fuzzy: None,
        }
    }

    /// The non-terminal job for `analysis_type`, if any.
    pub fn active_job(&self, analysis_type: AnalysisType) -> Option<&AnalysisJob> {
        self.jobs
            .iter()
            .find(|j| j.analysis_type == analysis_type && j.is_active())
    }

    pub fn job(&self, id: Uuid) -> Option<&AnalysisJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn job_mut(&mut self, id: Uuid) -> Option<&mut AnalysisJob> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Most recent job of a type, terminal or not.
    pub fn latest_job(&self, analysis_type: AnalysisType) -> Option<&AnalysisJob> {
        self.jobs
            .iter()
            .filter(|j| j.analysis_type == analysis_type)
            .max_by_key(|j| j.started_at)
    }

    /// Whether a results section exists for `analysis_type`.
    pub fn has_results(&self, analysis_type: AnalysisType) -> bool {
        match analysis_type {
            AnalysisType::Static => self.static_analysis.is_some(),
            AnalysisType::Dynamic => self.dynamic.is_some(),
            AnalysisType::HolyGrail => self.holygrail.is_some(),
            AnalysisType::Fuzzy => self.fuzzy.is_some(),
            AnalysisType::Blender => false,
        }
    }

    /// Analysis types with stored results.
    pub fn completed_types(&self) -> Vec<AnalysisType> {
        AnalysisType::ALL
            .into_iter()
            .filter(|ty| self.has_results(*ty))
            .collect()
    }

    /// Fail every job left non-terminal, e.g. by a crash mid-analysis.
    ///
    /// Returns how many jobs were changed.
    pub fn fail_orphaned_jobs(&mut self, reason: &str) -> usize {
        let mut changed = 0;
        for job in self.jobs.iter_mut().filter(|j| j.is_active()) {
            if job.transition(crate::types::JobStatus::Failed).is_ok() {
                job.message = Some(reason.to_owned());
                changed += 1;
            }
        }
        changed
    }
}
