//! Server process supervision: shell spawn, merged output reader,
//! bounded termination.
//!
//! Stdout and stderr are piped and merged into one line channel fed by a
//! single background reader task. The control flow only ever performs
//! non-blocking drains, so a chatty server can never stall the harness.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, warn};

/// A spawned server process and the receiving half of its output channel.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    rx: mpsc::UnboundedReceiver<String>,
    pid: Option<u32>,
}

impl ServerProcess {
    /// Spawn `command` through the platform shell with `cwd` as the working
    /// directory, capturing stdout and stderr as text.
    ///
    /// Failure here is fatal to the run: if the shell itself cannot be
    /// launched (or `cwd` does not exist) there is nothing to probe.
    pub fn spawn(command: &str, cwd: &Path) -> Result<Self> {
        let mut cmd = shell_command(command);
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to launch server command {:?} in {}",
                command,
                cwd.display()
            )
        })?;

        let stdout = child.stdout.take().context("child has no stdout pipe")?;
        let stderr = child.stderr.take().context("child has no stderr pipe")?;
        let pid = child.id();

        let (tx, rx) = mpsc::unbounded_channel();

        // One reader task per process. It owns both pipes, merged into a
        // single line stream, and runs until the child closes them.
        tokio::spawn(async move {
            let out = LinesStream::new(BufReader::new(stdout).lines());
            let err = LinesStream::new(BufReader::new(stderr).lines());
            let mut merged = futures::stream::select(out, err);

            while let Some(line) = merged.next().await {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            // Consumer went away; nothing left to do.
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading server output");
                        break;
                    }
                }
            }
            debug!("server output streams closed");
        });

        Ok(Self { child, rx, pid })
    }

    /// OS pid as observed at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Drain every currently queued output line without blocking.
    ///
    /// Lines come back in the order the reader task queued them.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Whether the child is still alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_status)) => false,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "error checking server status");
                false
            }
        }
    }

    /// Terminate the child: graceful signal, wait up to `grace`, then a
    /// hard kill. Safe to call on a process that has already exited.
    pub async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!(?status, "server already exited");
            return Ok(());
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                // SAFETY: pid comes from a child we spawned and have not reaped.
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    warn!(pid, "SIGTERM failed, proceeding to kill");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(?status, "server exited after termination request");
            }
            _ => {
                debug!("server did not exit within grace period, killing");
                if let Err(e) = self.child.kill().await {
                    // kill on an exited process is not an error we care about
                    warn!(error = %e, "kill failed");
                }
            }
        }

        Ok(())
    }
}

/// Build a `Command` that runs `command` through the platform shell.
fn shell_command(command: &str) -> Command {
    #[cfg(unix)]
    let cmd = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    #[cfg(windows)]
    let cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    };
    cmd
}
