//! Child process management for the classifier program.
//!
//! Unlike a captured run, the child's stdout and stderr go straight into the
//! task's trace file so the progress record grows while the program runs
//! and survives a kill.
//!
//! The program may be a wrapper script that starts further processes, so on
//! unix the child leads its own process group and a timeout kills the whole
//! group.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

use super::{ProgramError, ProgramExit};

/// Spawn `cmd` with both output streams appended to `trace_path` and wait
/// at most `deadline` for it to exit.
///
/// On timeout every process in the child's group is killed and the child is
/// reaped before returning.
pub async fn run_logged(
    cmd: &mut Command,
    trace_path: &Path,
    deadline: Duration,
) -> Result<ProgramExit, ProgramError> {
    let trace = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(trace_path)
        .await
        .map_err(ProgramError::Io)?
        .into_std()
        .await;
    let trace_err = trace.try_clone().map_err(ProgramError::Io)?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(trace))
        .stderr(Stdio::from(trace_err))
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(ProgramError::Spawn)?;

    match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => Ok(ProgramExit {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(ProgramError::Io(e)),
        Err(_elapsed) => {
            kill_tree(&mut child).await;
            Err(ProgramError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
        // SAFETY: killpg only sends a signal; the group id is the child's pid
        // because it was spawned with process_group(0).
        if unsafe { libc::killpg(pid, libc::SIGKILL) } != 0 {
            tracing::warn!(
                pid,
                error = %std::io::Error::last_os_error(),
                "Failed to kill classifier process group",
            );
        }
    }

    if let Err(e) = child.kill().await {
        tracing::warn!(error = %e, "Failed to kill classifier process");
    }
}
