//! Process liveness and process-tree termination.
//!
//! Every tool and payload is spawned as the leader of its own process group
//! (unix) so the whole tree can be killed at once. On Windows the tree is
//! killed with `taskkill /T`.

use std::io;

#[cfg(not(any(unix, windows)))]
use tracing::warn;

/// Check if a process with the given PID is alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use std::io::ErrorKind;

    let Some(pid) = signalable(pid) else {
        return false;
    };

    // SAFETY: kill(2) with signal 0 performs only the existence and
    // permission check and does not affect the target process
    let result = unsafe { libc::kill(pid, 0) };

    if result == 0 {
        true
    } else {
        // EPERM: the process exists but belongs to someone else
        io::Error::last_os_error().kind() == ErrorKind::PermissionDenied
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&format!("\"{pid}\"")))
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
pub fn is_process_alive(_pid: u32) -> bool {
    warn!("process liveness check not supported on this platform");
    false
}

/// Forcibly terminate `pid` and all of its descendants.
///
/// `pid` must be a process this engine spawned: on unix it is expected to
/// lead its own process group. A process that is already gone is not an
/// error.
#[cfg(unix)]
pub async fn kill_process_tree(pid: u32) -> io::Result<()> {
    let pgid = signalable(pid).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, format!("refusing to signal pid {pid}"))
    })?;

    // SAFETY: killpg(2) only sends a signal; pgid is a positive group id
    // checked above, so it can never address our own group or every process
    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }

    // not a group leader (or the group is gone): fall back to the single pid
    // SAFETY: as above, with a positive pid
    let result = unsafe { libc::kill(pgid, libc::SIGKILL) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(windows)]
pub async fn kill_process_tree(pid: u32) -> io::Result<()> {
    let output = tokio::process::Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .await?;
    // 128: no such process
    if output.status.success() || output.status.code() == Some(128) {
        Ok(())
    } else {
        Err(io::Error::other(
            String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        ))
    }
}

#[cfg(not(any(unix, windows)))]
pub async fn kill_process_tree(pid: u32) -> io::Result<()> {
    warn!(pid, "process tree termination not supported on this platform");
    Err(io::Error::from(io::ErrorKind::Unsupported))
}

/// Pids 0 and values that overflow `pid_t` address process groups or every
/// process and must never be signalled.
#[cfg(unix)]
fn signalable(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 0)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(is_process_alive(std::process::id()), "should see ourselves");
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }

    #[tokio::test]
    async fn refuses_to_signal_group_zero() {
        let err = kill_process_tree(0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn kills_spawned_group() {
        // Given: a sleeping child in its own process group
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        // When: the tree is killed
        kill_process_tree(pid).await.unwrap();

        // Then: the child exits on a signal
        let status = child.wait().await.unwrap();
        assert!(!status.success(), "killed child should not exit cleanly");
    }

    #[tokio::test]
    async fn killing_a_reaped_process_is_ok() {
        let mut child = tokio::process::Command::new("true")
            .process_group(0)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        assert!(kill_process_tree(pid).await.is_ok());
    }
}
