//! External Tool Process Module
//!
//! Wrapper around `std::process::Child` for long-running converters.
//!
//! ## Pipe deadlock
//!
//! OS pipe buffers are small (64KB on most systems). A tool that writes a lot
//! to a pipe nobody reads blocks forever, so both stdout and stderr are
//! drained on dedicated threads from the moment the child starts.
//!
//! ## Deadline and cancellation
//!
//! [`ToolProcess::wait_until`] polls the child, a wall-clock deadline and a
//! [`CancelToken`]. On timeout or cancellation the whole process group is
//! killed and reaped before returning, so no child outlives its caller.
//!
//! ```ignore
//! use shared_utils::tool_process::{ToolExit, ToolProcess};
//! use std::process::Command;
//!
//! let mut cmd = Command::new("gs");
//! cmd.args(["-sDEVICE=pdfwrite", "-o", "out.pdf", "in.pdf"]);
//! let process = ToolProcess::spawn(&mut cmd, |line| println!("{line}"))?;
//! match process.wait_until(Some(Duration::from_secs(300)), &token)? {
//!     ToolExit::Exited { status, .. } if status.success() => {}
//!     other => eprintln!("{other:?}"),
//! }
//! ```

use crate::cancel::CancelToken;
use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Keep at most this much stderr per process.
const STDERR_LIMIT: usize = 64 * 1024;

/// How a supervised process ended.
#[derive(Debug)]
pub enum ToolExit {
    /// The process exited on its own.
    Exited { status: ExitStatus, stderr: String },
    /// The deadline passed; the process was killed.
    TimedOut { after: Duration },
    /// The cancel token fired; the process was killed.
    Cancelled,
}

pub struct ToolProcess {
    child: Child,
    stdout_thread: Option<JoinHandle<()>>,
    stderr_thread: Option<JoinHandle<String>>,
    started: Instant,
}

impl ToolProcess {
    /// Spawn `cmd` with piped stdout/stderr and a null stdin.
    ///
    /// `on_stdout_line` runs on the stdout drain thread for every line the
    /// tool prints.
    pub fn spawn<F>(cmd: &mut Command, mut on_stdout_line: F) -> Result<Self>
    where
        F: FnMut(&str) + Send + 'static,
    {
        info!(command = ?cmd, "Executing external tool");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // own group: kill() reaches grandchildren too
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().context("Failed to spawn external tool")?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture tool stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture tool stderr"))?;

        let stdout_thread = thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.split(b'\n').map_while(|l| l.ok()) {
                on_stdout_line(String::from_utf8_lossy(&line).trim_end());
            }
        });

        let stderr_thread = thread::spawn(move || {
            let mut raw = Vec::new();
            let mut reader = BufReader::new(stderr);
            let mut chunk = [0u8; 8192];
            while let Ok(n) = reader.read(&mut chunk) {
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&chunk[..n]);
                if raw.len() > STDERR_LIMIT {
                    let excess = raw.len() - STDERR_LIMIT;
                    raw.drain(..excess);
                }
            }
            String::from_utf8_lossy(&raw).into_owned()
        });

        Ok(Self {
            child,
            stdout_thread: Some(stdout_thread),
            stderr_thread: Some(stderr_thread),
            started: Instant::now(),
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Block until the process exits, `deadline` passes, or `cancel` fires.
    ///
    /// `None` means no deadline.
    pub fn wait_until(mut self, deadline: Option<Duration>, cancel: &CancelToken) -> Result<ToolExit> {
        loop {
            if cancel.is_cancelled() {
                warn!(pid = self.id(), "Cancellation requested, killing external tool");
                self.terminate()?;
                return Ok(ToolExit::Cancelled);
            }

            if let Some(limit) = deadline {
                if self.started.elapsed() >= limit {
                    warn!(
                        pid = self.id(),
                        deadline_secs = limit.as_secs_f64(),
                        "External tool exceeded its deadline, killing it"
                    );
                    self.terminate()?;
                    return Ok(ToolExit::TimedOut { after: limit });
                }
            }

            match self.child.try_wait().context("Failed to poll external tool")? {
                Some(status) => {
                    if let Some(handle) = self.stdout_thread.take() {
                        let _ = handle.join();
                    }
                    let stderr = self
                        .stderr_thread
                        .take()
                        .map(|t| t.join().unwrap_or_default())
                        .unwrap_or_default();
                    debug!(pid = self.id(), exit_code = status.code(), "External tool exited");
                    return Ok(ToolExit::Exited { status, stderr });
                }
                None => thread::sleep(POLL_INTERVAL),
            }
        }
    }

    /// Kill the process (and its group on Unix) and reap it.
    ///
    /// The drain threads are detached rather than joined: a grandchild that
    /// inherited the pipes could keep them open past the kill.
    pub fn terminate(&mut self) -> Result<()> {
        #[cfg(unix)]
        {
            if let Ok(pgid) = libc::pid_t::try_from(self.child.id()) {
                // SAFETY: plain syscall on a process group we created in spawn().
                unsafe {
                    libc::kill(-pgid, libc::SIGKILL);
                }
            }
        }

        match self.child.kill() {
            Ok(()) => {}
            // already exited
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e).context("Failed to kill external tool"),
        }
        self.child
            .wait()
            .context("Failed to reap killed external tool")?;

        self.stdout_thread.take();
        self.stderr_thread.take();
        Ok(())
    }
}

impl Drop for ToolProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.terminate();
        }
    }
}
