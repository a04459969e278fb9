//! Per-analysis-type pipelines.
//!
//! Each pipeline turns a target into a [`JobOutput`] without touching the
//! result store; the orchestrator owns job bookkeeping and persistence.

pub(crate) mod dynamic;
pub(crate) mod static_scan;

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use litterbox_core::driver::ByovdAssessment;
use litterbox_core::record::FuzzyMatch;
use litterbox_core::target::PeInfo;
use litterbox_core::types::{JobStatus, ScannerStatus};
use litterbox_risk::ScanResults;

pub(crate) use dynamic::DynamicRun;

/// What a job will run against, resolved before the job is recorded.
#[derive(Debug, Clone)]
pub(crate) enum Plan {
    Static { path: PathBuf },
    Dynamic { launch: Launch },
    HolyGrail { pe: Box<PeInfo> },
    Fuzzy { path: PathBuf },
}

/// How a dynamic run gets its process.
#[derive(Debug, Clone)]
pub(crate) enum Launch {
    /// Start the stored artifact as a new process.
    Payload { path: PathBuf },
    /// Scan a process that is already running. Never killed.
    Attach { pid: u32 },
}

/// Results produced by a pipeline, ready to be written to the record.
#[derive(Debug)]
pub(crate) enum JobOutput {
    Static(ScanResults),
    Dynamic(Box<DynamicRun>),
    HolyGrail {
        assessment: ByovdAssessment,
        imports: Vec<String>,
    },
    Fuzzy {
        threshold: f64,
        matches: Vec<FuzzyMatch>,
    },
}

/// Terminal status of a job and what (if anything) to store.
#[derive(Debug)]
pub(crate) struct JobOutcome {
    pub status: JobStatus,
    pub message: Option<String>,
    pub output: Option<JobOutput>,
}

impl JobOutcome {
    /// Status derived from the scanner outcomes.
    pub fn scanned(results: &ScanResults) -> Self {
        Self {
            status: JobStatus::from_scanner_outcomes(results.values().map(|r| &r.status)),
            message: summarize(results),
            output: None,
        }
    }

    pub fn with_output(mut self, output: JobOutput) -> Self {
        self.output = Some(output);
        self
    }

    pub fn completed(output: JobOutput) -> Self {
        Self {
            status: JobStatus::Completed,
            message: None,
            output: Some(output),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            message: Some(message.into()),
            output: None,
        }
    }
}

/// "2 of 3 scanners failed" style note, only when something went wrong.
fn summarize(results: &ScanResults) -> Option<String> {
    let failed: Vec<&str> = results
        .values()
        .filter(|r| {
            matches!(r.status, ScannerStatus::Error | ScannerStatus::Timeout)
        })
        .map(|r| r.scanner.as_str())
        .collect();
    (!failed.is_empty()).then(|| format!("scanners not successful: {}", failed.join(", ")))
}

/// Sleep for `duration` unless cancelled first. Returns false on cancel.
pub(crate) async fn wait(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}
