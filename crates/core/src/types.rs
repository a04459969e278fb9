//! Domain types shared across the engine.
//!
//! Everything here is plain data: identities, status enums, detections and
//! risk assessments. Behavior that depends on configuration or I/O lives in
//! the crates that own it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::findings::ScanFindings;

/// Severity level of a single detection.
///
/// `Ord` follows escalation: `Info < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a severity name, case-insensitively.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "info" | "informational" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" | "med" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Map a 0–100 rule score onto a severity.
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Self::Critical,
            70..=89 => Self::High,
            40..=69 => Self::Medium,
            20..=39 => Self::Low,
            _ => Self::Info,
        }
    }

    /// Upper-case name as used in risk factor messages.
    pub fn as_upper(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "Info"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// Identity of an analysis target: a content hash or a process id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Target id for a live process.
    pub fn from_pid(pid: u32) -> Self {
        Self(pid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is safe to use as a single path component.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What kind of thing is being analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    File,
    Driver,
    Process,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Driver => write!(f, "driver"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// Analysis types a job can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisType {
    Static,
    Dynamic,
    HolyGrail,
    Blender,
    Fuzzy,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        Self::Static,
        Self::Dynamic,
        Self::HolyGrail,
        Self::Blender,
        Self::Fuzzy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::HolyGrail => "holygrail",
            Self::Blender => "blender",
            Self::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            "holygrail" | "byovd" | "driver" => Ok(Self::HolyGrail),
            "blender" => Ok(Self::Blender),
            "fuzzy" => Ok(Self::Fuzzy),
            other => Err(format!(
                "unknown analysis type '{other}' (expected: static, dynamic, holygrail, blender, fuzzy)"
            )),
        }
    }
}

/// Lifecycle status of an analysis job.
///
/// Transitions only move forward: `pending -> running -> terminal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Partial | Self::Failed | Self::Cancelled
        )
    }

    /// Whether moving from `self` to `next` is a forward transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Derive a job's terminal status from its scanner outcomes.
    ///
    /// Skipped scanners count neither way. A job with no runnable scanner is
    /// `Completed` with nothing to report.
    pub fn from_scanner_outcomes<'a>(statuses: impl IntoIterator<Item = &'a ScannerStatus>) -> Self {
        let (mut succeeded, mut failed) = (0usize, 0usize);
        for status in statuses {
            match status {
                ScannerStatus::Success => succeeded += 1,
                ScannerStatus::Error | ScannerStatus::Timeout => failed += 1,
                ScannerStatus::Skipped => {}
            }
        }
        match (succeeded, failed) {
            (_, 0) => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::Partial,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one scanner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerStatus {
    Success,
    Error,
    Timeout,
    Skipped,
}

impl fmt::Display for ScannerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// A scanner-specific finding normalized to a common shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Rule name or finding category.
    pub rule: String,
    pub severity: Severity,
    /// Human-readable note.
    pub note: String,
}

impl Detection {
    pub fn new(rule: impl Into<String>, severity: Severity, note: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            note: note.into(),
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.rule, self.note)
    }
}

/// Verbatim tool output, kept for audit even when parsing fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    /// Contents of the tool's designated output file, if it wrote one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

impl RawOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.trim().is_empty()
            && self.stderr.trim().is_empty()
            && self.output_file.as_deref().is_none_or(|s| s.trim().is_empty())
    }
}

/// The recorded outcome of running one scanner against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerResult {
    pub scanner: String,
    pub status: ScannerStatus,
    pub raw: RawOutput,
    pub detections: Vec<Detection>,
    /// Tool-specific parsed data used by risk scoring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<ScanFindings>,
    /// Why the scanner did not succeed, or a parse warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

impl ScannerResult {
    /// A result for a scanner that was not run.
    pub fn skipped(scanner: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scanner: scanner.into(),
            status: ScannerStatus::Skipped,
            raw: RawOutput::default(),
            detections: Vec::new(),
            findings: None,
            message: Some(reason.into()),
            duration_ms: 0,
            exit_code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ScannerStatus::Success
    }
}

/// General risk level bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// `>=75` Critical, `>=50` High, `>=25` Medium, else Low.
    pub fn from_score(score: u8) -> Self {
        match score {
            75.. => Self::Critical,
            50..=74 => Self::High,
            25..=49 => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        f.write_str(s)
    }
}

/// A general risk assessment for a file or process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub score: u8,
    pub level: RiskLevel,
    /// Contributing factors, in the order they were found.
    pub factors: Vec<String>,
}

impl RiskAssessment {
    pub fn new(score: u8, factors: Vec<String>) -> Self {
        let score = score.min(100);
        Self {
            score,
            level: RiskLevel::from_score(score),
            factors,
        }
    }
}

/// Health of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}
