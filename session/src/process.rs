//! Engine process ownership and process-tree termination.
//!
//! The engine may spawn helper processes of its own, so termination always
//! targets the whole tree: the process group on Unix (the engine is started
//! in a new session, making pid == pgid), `taskkill /T` on Windows.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use fcs_types::RootId;

async fn forward_lines(root: RootId, stream: &'static str, pipe: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => tracing::info!(target: "fcs::engine", root = %root, stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(root = %root, stream, "engine output read failed: {e}");
                break;
            }
        }
    }
}

/// Owns a spawned engine and guarantees it does not outlive its owner.
///
/// Dropping the guard kills the process tree without waiting; call
/// [`ChildGuard::terminate`] to kill and reap it.
pub struct ChildGuard {
    child: Option<Child>,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Forward the engine's stdout and stderr, line by line, to tracing.
    ///
    /// The forwarding tasks end on their own when the pipes close.
    pub(crate) fn forward_output(&mut self, root: RootId) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(root, "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(root, "stderr", stderr));
        }
    }

    /// Resolves once the engine exits.
    pub(crate) async fn wait_exit(&mut self) -> Option<std::process::ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await.ok(),
            None => std::future::pending().await,
        }
    }

    /// Kill the process tree and wait (at most `grace`) for the engine to be reaped.
    pub async fn terminate(mut self, grace: Duration) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(pid) = child.id() {
            kill_tree(pid).await;
        }
        // Covers the case where the tree kill could not reach the engine itself.
        let _ = child.start_kill();
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!(%status, "engine process reaped"),
            Ok(Err(e)) => tracing::debug!("waiting for engine process failed: {e}"),
            Err(_) => tracing::warn!("engine process not reaped within {grace:?}"),
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // SAFETY: plain syscall on a pid we spawned.
            unsafe {
                libc::killpg(pid as i32, libc::SIGKILL);
            }
        }
        let _ = child.start_kill();
        let _ = child.try_wait();
    }
}

#[cfg(unix)]
#[allow(clippy::unused_async)] // async for parity with the Windows variant
async fn kill_tree(pid: u32) {
    // SAFETY: plain syscall on a pid we spawned.
    let rc = unsafe { libc::killpg(pid as i32, libc::SIGKILL) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(pid, "killpg failed: {err}");
        }
    }
}

#[cfg(windows)]
async fn kill_tree(pid: u32) {
    let output = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &pid.to_string()])
        .output()
        .await;
    match output {
        Ok(o) if !o.status.success() => {
            let stderr = String::from_utf8_lossy(&o.stderr);
            tracing::debug!(pid, %stderr, "taskkill failed (process may have already exited)");
        }
        Err(e) => tracing::debug!(pid, "failed to run taskkill: {e}"),
        Ok(_) => {}
    }
}

/// Start the child in its own session so the whole group can be killed.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    // SAFETY: the pre_exec closure only calls async-signal-safe functions.
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Linux-only: the engine dies with us even on SIGKILL.
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
pub fn set_new_session(_cmd: &mut Command) {}
