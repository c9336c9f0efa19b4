//! Stub tools and scripted collaborators shared by the unit tests.

use crate::fs::{Filesystem, LocalFs, CROSS_DEVICE_CODE};
use crate::recovery::{RecoveryDecision, RecoveryPrompt};
use crate::task::ToolInvocation;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// `sh -c <script> stub <INPUT> <OUTPUT>`: the script sees `$1` and `$2`.
pub fn stub_invocation(script: &str) -> ToolInvocation {
    ToolInvocation::new("sh")
        .arg("-c")
        .arg(script)
        .arg("stub")
        .input()
        .output()
}

pub fn write_input(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<u8> = (0..len).map(|i| b'a' + (i % 26) as u8).collect();
    std::fs::write(&path, body).unwrap();
    path
}

/// Replays decisions in order; records which files it was asked about.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    decisions: VecDeque<RecoveryDecision>,
    pub asked: Vec<PathBuf>,
}

impl ScriptedPrompt {
    pub fn new(decisions: impl IntoIterator<Item = RecoveryDecision>) -> Self {
        Self {
            decisions: decisions.into_iter().collect(),
            asked: Vec::new(),
        }
    }
}

impl RecoveryPrompt for ScriptedPrompt {
    fn decide(&mut self, file: &Path, _error: &io::Error) -> RecoveryDecision {
        self.asked.push(file.to_path_buf());
        self.decisions
            .pop_front()
            .expect("prompt asked more often than scripted")
    }
}

/// Which operation a [`FlakyFs`] sabotages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOn {
    CreateDir,
    Copy,
    Rename,
}

/// Real file system that fails the first `failures` calls of one kind for
/// destinations containing `needle`.
#[derive(Debug)]
pub struct FlakyFs {
    fault_on: FaultOn,
    needle: String,
    kind: io::ErrorKind,
    remaining: AtomicUsize,
    pub calls: AtomicUsize,
    inner: LocalFs,
}

impl FlakyFs {
    pub fn new(fault_on: FaultOn, needle: &str, failures: usize, kind: io::ErrorKind) -> Self {
        Self {
            fault_on,
            needle: needle.to_string(),
            kind,
            remaining: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            inner: LocalFs,
        }
    }

    pub fn locked(fault_on: FaultOn, needle: &str, failures: usize) -> Self {
        Self::new(fault_on, needle, failures, io::ErrorKind::PermissionDenied)
    }

    fn check(&self, op: FaultOn, target: &Path) -> io::Result<()> {
        if op != self.fault_on || !target.to_string_lossy().contains(&self.needle) {
            return Ok(());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let still_failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if still_failing {
            Err(io::Error::new(self.kind, format!("simulated fault on {}", target.display())))
        } else {
            Ok(())
        }
    }
}

impl Filesystem for FlakyFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check(FaultOn::CreateDir, path)?;
        self.inner.create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.check(FaultOn::Copy, to)?;
        self.inner.copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.check(FaultOn::Rename, to)?;
        self.inner.rename(from, to)
    }
}

/// Temp files this process created through the worker that still exist.
pub fn leftover_artifacts(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| p.exists()).cloned().collect()
}

/// Renames between folders fail as if they crossed devices. With
/// `disk_full`, copies truncate the target, write a little and then fail
/// the way `fs::copy` does on a full disk.
#[derive(Debug, Default)]
pub struct CrossDeviceFs {
    pub disk_full: bool,
}

impl Filesystem for CrossDeviceFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        LocalFs.create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if self.disk_full {
            std::fs::write(to, b"%P")?;
            return Err(io::Error::from_raw_os_error(libc::ENOSPC));
        }
        LocalFs.copy(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if from.parent() != to.parent() {
            return Err(io::Error::from_raw_os_error(CROSS_DEVICE_CODE));
        }
        LocalFs.rename(from, to)
    }
}

/// Sorted file names in `dir`.
pub fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
