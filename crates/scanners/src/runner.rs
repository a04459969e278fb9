//! Subprocess execution with a hard wall-clock timeout.
//!
//! The timeout is enforced on the process, not on our wait: when it elapses
//! (or the job is cancelled) the tool's entire process tree is killed and
//! reaped before [`run_command`] returns.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::CommandLine;
use crate::process::kill_process_tree;

/// Output beyond this many bytes per stream is read and discarded.
pub const DEFAULT_OUTPUT_LIMIT: usize = 8 * 1024 * 1024;

/// Grace period for pipe readers after the process is gone. Grandchildren
/// that escaped the kill can hold a pipe open forever.
const READER_GRACE: Duration = Duration::from_secs(2);

/// How a tool run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited,
    TimedOut,
    Cancelled,
    SpawnFailed(String),
}

/// Everything observed from one tool run.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub outcome: RunOutcome,
    pub duration: Duration,
    /// Either stream exceeded the output limit.
    pub truncated: bool,
}

impl ToolRun {
    fn spawn_failed(reason: String, started: Instant) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            outcome: RunOutcome::SpawnFailed(reason),
            duration: started.elapsed(),
            truncated: false,
        }
    }
}

/// Build a command for a tool or payload: no stdin, piped output, own
/// process group, killed if the handle is dropped.
pub fn command(cmd: &CommandLine) -> Command {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}

/// Run `cmd` to completion, timeout or cancellation.
pub async fn run_command(
    cmd: &CommandLine,
    timeout: Duration,
    cancel: &CancellationToken,
    output_limit: usize,
) -> ToolRun {
    let started = Instant::now();

    let mut child = match command(cmd).spawn() {
        Ok(child) => child,
        Err(e) => return ToolRun::spawn_failed(format!("{}: {e}", cmd.program), started),
    };
    let (stdout_task, stderr_task) = spawn_readers(&mut child, output_limit);

    let (outcome, exit_code) = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => (RunOutcome::Exited, status.code()),
            Err(e) => {
                warn!(program = %cmd.program, error = %e, "failed to wait on tool");
                (RunOutcome::Exited, None)
            }
        },
        () = tokio::time::sleep(timeout) => (RunOutcome::TimedOut, None),
        () = cancel.cancelled() => (RunOutcome::Cancelled, None),
    };

    if outcome != RunOutcome::Exited {
        terminate(&mut child).await;
    }

    let (stdout, out_truncated) = join_reader(stdout_task).await;
    let (stderr, err_truncated) = join_reader(stderr_task).await;

    debug!(
        program = %cmd.program,
        ?outcome,
        exit_code,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool finished"
    );

    ToolRun {
        stdout,
        stderr,
        exit_code,
        outcome,
        duration: started.elapsed(),
        truncated: out_truncated || err_truncated,
    }
}

/// Kill the child's whole tree and reap it.
pub async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        if let Err(e) = kill_process_tree(pid).await {
            warn!(pid, error = %e, "process tree kill failed, killing leader only");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already reaped");
    }
}

type ReaderTask = Option<JoinHandle<(Vec<u8>, bool)>>;

/// Start draining both pipes so a chatty tool can never block on a full pipe.
pub fn spawn_readers(child: &mut Child, limit: usize) -> (ReaderTask, ReaderTask) {
    let stdout = child
        .stdout
        .take()
        .map(|r| tokio::spawn(read_bounded(r, limit)));
    let stderr = child
        .stderr
        .take()
        .map(|r| tokio::spawn(read_bounded(r, limit)));
    (stdout, stderr)
}

/// Collect reader output, giving up after a short grace period.
pub async fn join_reader(task: ReaderTask) -> (String, bool) {
    let Some(task) = task else {
        return (String::new(), false);
    };
    let abort = task.abort_handle();
    match tokio::time::timeout(READER_GRACE, task).await {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            (String::new(), false)
        }
        Err(_) => {
            abort.abort();
            warn!("output pipe held open after exit, output discarded");
            (String::new(), true)
        }
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
pub async fn read_bounded<R>(mut reader: R, limit: usize) -> (Vec<u8>, bool)
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let room = limit.saturating_sub(kept.len());
                if n > room {
                    truncated = true;
                }
                kept.extend_from_slice(&buf[..n.min(room)]);
            }
            Err(e) => {
                debug!(error = %e, "output read error");
                break;
            }
        }
    }
    (kept, truncated)
}
