//! A single external process with a deadline.
//!
//! [`ProcessHandle`] wraps a spawned child whose output goes straight to log
//! files. Termination is graceful first: SIGTERM, a grace period, then
//! SIGKILL. Cancelling twice, or after the process exited, does nothing.

use mdk_protocol::CommandLine;
use std::fs::File;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Lifecycle of a [`ProcessHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Started,
    Running,
    Completed,
    TimedOut,
    Killed,
}

impl ProcessState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ProcessState::Completed | ProcessState::TimedOut | ProcessState::Killed
        )
    }
}

/// How waiting on a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Exited on its own. `None` means it was ended by a signal.
    Exited(Option<i32>),
    TimedOut,
}

#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    state: ProcessState,
    grace: Duration,
}

impl ProcessHandle {
    /// Spawns `command` in `cwd` with stdout and stderr going to the given
    /// files. Text configured as stdin is fed in and the pipe is closed.
    ///
    /// # Errors
    ///
    /// Returns the spawn error if the executable cannot be started.
    pub fn spawn(
        command: &CommandLine,
        cwd: &Path,
        stdout: File,
        stderr: File,
        grace: Duration,
    ) -> std::io::Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(cwd)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd.spawn()?;
        let pid = child.id();
        debug!(?pid, program = %command.program.display(), "Spawned process");

        if let (Some(input), Some(mut pipe)) = (command.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                let _ = pipe.write_all(input.as_bytes()).await;
                let _ = pipe.shutdown().await;
            });
        }

        let mut handle = Self {
            child,
            pid,
            state: ProcessState::Started,
            grace,
        };
        handle.state = ProcessState::Running;
        Ok(handle)
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Waits for the process, terminating it once `timeout` elapses.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> std::io::Result<ProcessOutcome> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.state = ProcessState::Completed;
                Ok(ProcessOutcome::Exited(status.code()))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(pid = ?self.pid, ?timeout, "Process exceeded its time limit");
                self.terminate(ProcessState::TimedOut).await;
                Ok(ProcessOutcome::TimedOut)
            }
        }
    }

    /// Terminates the process. Idempotent.
    pub async fn cancel(&mut self) -> ProcessState {
        self.terminate(ProcessState::Killed).await
    }

    async fn terminate(&mut self, final_state: ProcessState) -> ProcessState {
        if self.state.is_finished() {
            return self.state;
        }

        let signalled = match self.pid {
            Some(pid) => send_terminate(pid),
            None => false,
        };

        let exited = signalled
            && tokio::time::timeout(self.grace, self.child.wait())
                .await
                .is_ok();

        if !exited {
            debug!(pid = ?self.pid, "Grace period over, killing process");
            let _ = self.child.kill().await;
        }

        self.state = final_state;
        self.state
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(errno) => {
            debug!(pid, %errno, "SIGTERM not delivered");
            false
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> bool {
    false
}
