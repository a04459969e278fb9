//! Live execution: launch or attach, scan memory, collect behavior.
//!
//! Runs while the orchestrator holds the execution slot. Every path through
//! [`run`] stops the collectors and terminates a payload it launched before
//! returning. Attached processes are scanned but never signalled.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use litterbox_core::config::LitterboxConfig;
use litterbox_core::error::ScannerError;
use litterbox_core::record::{DynamicMetadata, ProcessOutput};
use litterbox_core::target::AnalysisTarget;
use litterbox_core::types::{ScannerResult, ScannerStatus};
use litterbox_risk::ScanResults;
use litterbox_scanners::runner::{self, join_reader, spawn_readers};
use litterbox_scanners::{
    Collector, CommandLine, ScanTarget, ScannerAdapter, ScannerKind, is_process_alive,
};

use super::{Launch, wait};

const LIVENESS_POLL: Duration = Duration::from_millis(100);

/// Everything a dynamic run produced.
#[derive(Debug)]
pub(crate) struct DynamicRun {
    pub results: ScanResults,
    pub process_output: Option<ProcessOutput>,
    pub metadata: DynamicMetadata,
}

/// A payload started by this run, with its output readers.
struct Payload {
    child: Child,
    readers: (
        Option<tokio::task::JoinHandle<(Vec<u8>, bool)>>,
        Option<tokio::task::JoinHandle<(Vec<u8>, bool)>>,
    ),
}

impl Payload {
    fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Terminate the tree if still running and collect what it printed.
    async fn finish(mut self) -> ProcessOutput {
        let note = match self.child.try_wait() {
            Ok(Some(status)) => format!("process exited with {status}"),
            _ => {
                runner::terminate(&mut self.child).await;
                "process was still running and was terminated".to_owned()
            }
        };
        let (stdout, out_truncated) = join_reader(self.readers.0).await;
        let (stderr, err_truncated) = join_reader(self.readers.1).await;
        ProcessOutput {
            had_output: !stdout.is_empty() || !stderr.is_empty(),
            output_truncated: out_truncated || err_truncated,
            note: Some(note),
            stdout,
            stderr,
        }
    }
}

pub(crate) async fn run(
    config: &LitterboxConfig,
    target: &AnalysisTarget,
    launch: Launch,
    cmd_args: &[String],
    cancel: &CancellationToken,
) -> DynamicRun {
    let started = Instant::now();
    let process = &config.analysis.process;
    let output_limit = process.max_output_bytes;
    let mut metadata = DynamicMetadata {
        cmd_args: cmd_args.to_vec(),
        ..DynamicMetadata::default()
    };

    // collectors first, so they see the payload start
    let collector_target = match &launch {
        Launch::Payload { path } => ScanTarget::file(path, image_name(path, &target.name)),
        Launch::Attach { pid } => ScanTarget::process(*pid, target.name.clone()),
    };
    let rededr = ScannerAdapter::new(ScannerKind::RedEdr, &config.scanners, false)
        .with_output_limit(output_limit);
    let collecting = rededr.is_enabled();
    let collector = Collector::start(rededr, collector_target.clone(), cancel);
    if collecting {
        wait(Duration::from_secs(process.etw_wait_secs), cancel).await;
    }

    let mut payload = None;
    let pid = match &launch {
        Launch::Payload { path } => {
            let cmd = CommandLine {
                program: path.display().to_string(),
                args: cmd_args.to_vec(),
            };
            match runner::command(&cmd).spawn() {
                Ok(mut child) => {
                    let readers = spawn_readers(&mut child, output_limit);
                    let pid = child.id();
                    info!(target_id = %target.id, pid, "payload started");
                    payload = Some(Payload { child, readers });
                    pid
                }
                Err(e) => {
                    warn!(target_id = %target.id, error = %e, "payload failed to start");
                    metadata.early_termination = true;
                    metadata.termination_note = Some(format!("failed to start payload: {e}"));
                    None
                }
            }
        }
        Launch::Attach { pid } => {
            metadata.attached = true;
            if is_process_alive(*pid) {
                Some(*pid)
            } else {
                metadata.early_termination = true;
                metadata.termination_note = Some(format!("process {pid} is not running"));
                None
            }
        }
    };
    metadata.pid = pid;

    if pid.is_some() {
        let init_wait = Duration::from_secs(process.init_wait_secs);
        let launched = Instant::now();
        loop {
            let exited = match (&mut payload, pid) {
                (Some(p), _) => p.has_exited(),
                (None, Some(pid)) => !is_process_alive(pid),
                (None, None) => true,
            };
            if exited {
                let note = format!(
                    "Process terminated after {:.2} seconds",
                    launched.elapsed().as_secs_f64()
                );
                info!(target_id = %target.id, pid, note = %note, "early termination");
                metadata.early_termination = true;
                metadata.termination_note = Some(note);
                break;
            }
            if launched.elapsed() >= init_wait || cancel.is_cancelled() {
                break;
            }
            wait(LIVENESS_POLL.min(init_wait), cancel).await;
        }
    }

    let mut results = ScanResults::new();
    let scan_target = match (&launch, pid) {
        (Launch::Payload { path }, Some(pid)) => {
            ScanTarget::file(path, image_name(path, &target.name)).with_pid(pid)
        }
        (_, Some(pid)) => ScanTarget::process(pid, target.name.clone()),
        _ => collector_target,
    };
    scan_live(config, &scan_target, &metadata, cancel, &mut results).await;

    let collected = collector.stop().await;
    results.insert(collected.scanner.clone(), collected);

    let process_output = match payload {
        Some(p) => Some(p.finish().await),
        None => None,
    };

    metadata.total_duration_secs =
        (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    DynamicRun {
        results,
        process_output,
        metadata,
    }
}

/// Memory scanners, one at a time, inside the execution window.
async fn scan_live(
    config: &LitterboxConfig,
    scan_target: &ScanTarget,
    metadata: &DynamicMetadata,
    cancel: &CancellationToken,
    results: &mut ScanResults,
) {
    let budget_secs = config.analysis.process.execution_timeout_secs;
    let window = cancel.child_token();
    let deadline = {
        let window = window.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(budget_secs)).await;
            window.cancel();
        })
    };

    for kind in ScannerKind::DYNAMIC {
        let adapter = ScannerAdapter::new(kind, &config.scanners, true)
            .with_output_limit(config.analysis.process.max_output_bytes);
        let name = adapter.name();

        let result = if !adapter.is_enabled() {
            adapter.run(scan_target, &window).await
        } else if metadata.early_termination {
            ScannerResult::skipped(name, "process terminated before scanning")
        } else if window.is_cancelled() && !cancel.is_cancelled() {
            out_of_time(name, budget_secs, false)
        } else {
            let mut result = adapter.run(scan_target, &window).await;
            let interrupted = ScannerError::Cancelled {
                scanner: name.to_owned(),
            }
            .to_string();
            if !cancel.is_cancelled() && result.message.as_deref() == Some(interrupted.as_str()) {
                let partial = out_of_time(name, budget_secs, true);
                result.status = partial.status;
                result.message = partial.message;
            }
            result
        };
        results.insert(name.to_owned(), result);
    }
    deadline.abort();
}

fn out_of_time(scanner: &str, budget_secs: u64, started: bool) -> ScannerResult {
    let mut result = ScannerResult::skipped(
        scanner,
        if started {
            format!("execution timeout of {budget_secs}s reached while scanning")
        } else {
            format!("execution timeout of {budget_secs}s reached before the scanner ran")
        },
    );
    result.status = ScannerStatus::Timeout;
    result
}

/// File name the payload runs under, which is what RedEdr traces.
fn image_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_owned())
}
