//! Scanner adapter: run one tool against one target and record the outcome.
//!
//! [`ScannerAdapter::run`] never fails. Whatever happens to the tool is
//! folded into a [`ScannerResult`]: raw output is always kept, parsing is
//! attempted even after a non-zero exit, and the status says how it ended.
//!
//! | outcome                         | status    | findings          |
//! |---------------------------------|-----------|-------------------|
//! | disabled / not applicable       | skipped   | none              |
//! | spawn failure                   | error     | none              |
//! | wall clock elapsed              | timeout   | best effort       |
//! | exit 0, output parsed           | success   | parsed            |
//! | exit 0, output unparsable       | error     | empty, raw kept   |
//! | exit != 0                       | error     | best effort       |

use std::path::{Path, PathBuf};
use std::time::Duration;

use litterbox_core::config::{ScannersConfig, ToolConfig};
use litterbox_core::error::ScannerError;
use litterbox_core::metrics as m;
use litterbox_core::types::{RawOutput, ScannerResult, ScannerStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{self, Placeholders, TemplateError};
use crate::kind::ScannerKind;
use crate::runner::{DEFAULT_OUTPUT_LIMIT, RunOutcome, ToolRun, run_command};

/// What a scanner is pointed at.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    /// Stored artifact, for file scanners.
    pub path: Option<PathBuf>,
    /// Display name; also the process image name RedEdr traces.
    pub name: String,
    /// Live process, for memory scanners.
    pub pid: Option<u32>,
}

impl ScanTarget {
    pub fn file(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            name: name.into(),
            pid: None,
        }
    }

    pub fn process(pid: u32, name: impl Into<String>) -> Self {
        Self {
            path: None,
            name: name.into(),
            pid: Some(pid),
        }
    }

    /// Attach a pid to a file target once its payload is running.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }
}

/// How cancellation of the run's token is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    /// Cancellation aborts the scan.
    Scan,
    /// Cancellation is the normal stop signal of a background collector.
    Collect,
}

/// One configured tool, ready to run.
#[derive(Debug, Clone)]
pub struct ScannerAdapter {
    kind: ScannerKind,
    config: ToolConfig,
    live: bool,
    output_limit: usize,
}

impl ScannerAdapter {
    /// Adapter for `kind`. `live` selects the process-scanning mode.
    pub fn new(kind: ScannerKind, scanners: &ScannersConfig, live: bool) -> Self {
        Self::with_config(kind, kind.tool_config(scanners, live).clone(), live)
    }

    pub fn with_config(kind: ScannerKind, config: ToolConfig, live: bool) -> Self {
        Self {
            kind,
            config,
            live,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    pub fn kind(&self) -> ScannerKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Run the tool against `target` within its configured timeout.
    pub async fn run(&self, target: &ScanTarget, cancel: &CancellationToken) -> ScannerResult {
        self.run_mode(target, cancel, RunMode::Scan).await
    }

    pub(crate) async fn run_mode(
        &self,
        target: &ScanTarget,
        cancel: &CancellationToken,
        mode: RunMode,
    ) -> ScannerResult {
        let name = self.name();

        if let Some(reason) = self.skip_reason(target, cancel) {
            debug!(scanner = name, reason, "scanner skipped");
            let result = ScannerResult::skipped(name, reason);
            record_metrics(&result);
            return result;
        }

        let scratch = match tempfile::Builder::new()
            .prefix(&format!("litterbox-{name}-"))
            .tempdir()
        {
            Ok(dir) => dir,
            Err(e) => {
                return self.failed(format!("failed to create scratch directory: {e}"));
            }
        };

        let values = Placeholders {
            tool_path: &self.config.tool_path,
            target_path: target.path.as_deref(),
            target_name: Some(target.name.as_str()),
            pid: target.pid,
            output_path: Some(scratch.path()),
            rules_path: Some(self.config.rules_path.as_str()).filter(|r| !r.is_empty()),
            extra_args: &self.config.extra_args,
        };

        let cmd = match command::render(&self.config.command, &values) {
            Ok(cmd) => cmd,
            Err(TemplateError::MissingValue(placeholder)) => {
                let result = ScannerResult::skipped(
                    name,
                    format!("not applicable: target has no {{{placeholder}}}"),
                );
                record_metrics(&result);
                return result;
            }
            Err(e) => return self.failed(format!("invalid command template: {e}")),
        };

        info!(scanner = name, command = %cmd, "running scanner");
        let run = run_command(&cmd, self.timeout(), cancel, self.output_limit).await;
        let output_file = self.read_output_file(&values, scratch.path()).await;

        let result = self.interpret(run, output_file, mode);
        record_metrics(&result);
        result
    }

    fn skip_reason(&self, target: &ScanTarget, cancel: &CancellationToken) -> Option<&'static str> {
        if !self.config.enabled {
            Some("disabled in configuration")
        } else if self.kind.needs_process(self.live) && target.pid.is_none() {
            Some("requires a running process")
        } else if cancel.is_cancelled() {
            Some("job cancelled")
        } else {
            None
        }
    }

    async fn read_output_file(&self, values: &Placeholders<'_>, scratch: &Path) -> Option<String> {
        if self.config.output_file.is_empty() {
            return None;
        }
        let relative = match command::substitute(&self.config.output_file, values) {
            Ok(rel) => rel,
            Err(e) => {
                warn!(scanner = self.name(), error = %e, "invalid output_file template");
                return None;
            }
        };
        let path = scratch.join(relative);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                debug!(scanner = self.name(), path = %path.display(), error = %e, "no output file");
                None
            }
        }
    }

    fn interpret(&self, run: ToolRun, output_file: Option<String>, mode: RunMode) -> ScannerResult {
        let name = self.name();
        let raw = RawOutput {
            stdout: run.stdout,
            stderr: run.stderr,
            output_file,
        };
        let mut result = ScannerResult {
            scanner: name.to_owned(),
            status: ScannerStatus::Error,
            raw,
            detections: Vec::new(),
            findings: None,
            message: None,
            duration_ms: run.duration.as_millis() as u64,
            exit_code: run.exit_code,
        };

        let completed = match (&run.outcome, mode) {
            (RunOutcome::SpawnFailed(reason), _) => {
                warn!(scanner = name, reason = %reason, "scanner failed to start");
                result.message = Some(
                    ScannerError::Invocation {
                        scanner: name.to_owned(),
                        reason: reason.clone(),
                    }
                    .to_string(),
                );
                return result;
            }
            (RunOutcome::TimedOut, _) => {
                warn!(scanner = name, timeout_secs = self.config.timeout_secs, "scanner timed out");
                result.status = ScannerStatus::Timeout;
                result.message = Some(
                    ScannerError::Timeout {
                        scanner: name.to_owned(),
                        timeout_secs: self.config.timeout_secs,
                    }
                    .to_string(),
                );
                false
            }
            (RunOutcome::Cancelled, RunMode::Scan) => {
                info!(scanner = name, "scanner cancelled");
                result.message = Some(
                    ScannerError::Cancelled {
                        scanner: name.to_owned(),
                    }
                    .to_string(),
                );
                return result;
            }
            (RunOutcome::Cancelled, RunMode::Collect) => true,
            (RunOutcome::Exited, _) => run.exit_code == Some(0),
        };

        match self.kind.parse(&result.raw) {
            Ok(parsed) => {
                result.detections = parsed.detections;
                result.findings = Some(parsed.findings);
                if completed {
                    result.status = ScannerStatus::Success;
                } else if result.status == ScannerStatus::Error {
                    result.message = Some(match run.exit_code {
                        Some(code) => format!("{name}: exited with status {code}"),
                        None => format!("{name}: terminated by signal"),
                    });
                }
            }
            Err(e) => {
                metrics::counter!(m::SCANNER_PARSE_ERRORS_TOTAL, m::LABEL_SCANNER => name)
                    .increment(1);
                warn!(scanner = name, error = %e, "unparsable scanner output");
                if result.message.is_none() {
                    result.message = Some(
                        ScannerError::Parse {
                            scanner: name.to_owned(),
                            reason: e.to_string(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        if run.truncated {
            debug!(scanner = name, "scanner output truncated");
        }
        info!(
            scanner = name,
            status = %result.status,
            detections = result.detections.len(),
            duration_ms = result.duration_ms,
            "scanner finished"
        );
        result
    }

    fn failed(&self, message: String) -> ScannerResult {
        warn!(scanner = self.name(), message = %message, "scanner could not run");
        let mut result = ScannerResult::skipped(self.name(), message);
        result.status = ScannerStatus::Error;
        record_metrics(&result);
        result
    }
}

fn record_metrics(result: &ScannerResult) {
    metrics::counter!(
        m::SCANNER_RUNS_TOTAL,
        m::LABEL_SCANNER => result.scanner.clone(),
        m::LABEL_STATUS => result.status.to_string()
    )
    .increment(1);
    if result.status != ScannerStatus::Skipped {
        metrics::histogram!(m::SCANNER_DURATION_SECONDS, m::LABEL_SCANNER => result.scanner.clone())
            .record(result.duration_ms as f64 / 1000.0);
    }
}
