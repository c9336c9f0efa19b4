//! Conversion worker: runs the tool for one task under a deadline.
//!
//! The tool always writes into a private temporary file. The worker never
//! touches the destination path and never asks the user anything; every
//! per-file problem becomes a [`ConversionOutcome`] instead of an error.

use crate::error::{BatchError, Result};
use crate::task::{TaskDescriptor, TaskId};
use shared_utils::{log_external_tool, tail_lines, CancelToken, ToolExit, ToolProcess};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempPath;
use tracing::{debug, info, warn};

const TOOL_NAME: &str = "ghostscript";

/// Lines of stderr kept as a failure reason.
const REASON_LINES: usize = 3;

#[derive(Debug)]
pub enum ConversionOutcome {
    /// The artifact is deleted when dropped.
    Succeeded { artifact: TempPath, new_size: u64 },
    ToolFailed { reason: String },
    TimedOut { deadline: Duration },
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Succeeded { .. })
    }
}

/// Produced exactly once per task.
#[derive(Debug)]
pub struct ConversionResult {
    pub task_id: TaskId,
    pub input: PathBuf,
    pub original_size: u64,
    pub outcome: ConversionOutcome,
    pub elapsed: Duration,
    /// `Page N` lines the tool printed.
    pub pages: usize,
}

/// Convert one task.
///
/// Returns `Err(BatchError::Interrupted)` only when `cancel` fires, either
/// before the tool starts (it is then never launched) or while it runs (it
/// is killed first).
pub fn convert(
    task: &TaskDescriptor,
    deadline: Option<Duration>,
    cancel: &CancelToken,
) -> Result<ConversionResult> {
    if cancel.is_cancelled() {
        return Err(BatchError::Interrupted);
    }

    let started = Instant::now();
    let finish = |original_size: u64, outcome: ConversionOutcome, pages: usize| ConversionResult {
        task_id: task.id,
        input: task.input.clone(),
        original_size,
        outcome,
        elapsed: started.elapsed(),
        pages,
    };

    let original_size = match fs::metadata(&task.input) {
        Ok(meta) => meta.len(),
        Err(e) => {
            warn!(task = %task.id, input = %task.input.display(), error = %e, "Cannot read input");
            let reason = format!("cannot read input: {}", e);
            return Ok(finish(0, ConversionOutcome::ToolFailed { reason }, 0));
        }
    };

    let artifact = match tempfile::Builder::new()
        .prefix("gs_batch_")
        .suffix(".pdf")
        .tempfile()
    {
        // close our handle; the tool opens the path itself
        Ok(file) => file.into_temp_path(),
        Err(e) => {
            let reason = format!("cannot create temporary file: {}", e);
            return Ok(finish(original_size, ConversionOutcome::ToolFailed { reason }, 0));
        }
    };

    let command_line = task.invocation.display(&task.input, &artifact);
    let mut cmd = task.invocation.command(&task.input, &artifact);

    let pages = Arc::new(AtomicUsize::new(0));
    let page_counter = Arc::clone(&pages);
    let process = match ToolProcess::spawn(&mut cmd, move |line| {
        if line.starts_with("Page ") {
            page_counter.fetch_add(1, Ordering::Relaxed);
        }
    }) {
        Ok(p) => p,
        Err(e) => {
            warn!(task = %task.id, command = %command_line, error = %e, "Failed to launch tool");
            let reason = format!("failed to launch {}: {:#}", task.invocation.program().display(), e);
            return Ok(finish(original_size, ConversionOutcome::ToolFailed { reason }, 0));
        }
    };
    debug!(task = %task.id, pid = process.id(), "Tool started");

    let exit = match process.wait_until(deadline, cancel) {
        Ok(exit) => exit,
        Err(e) => {
            let reason = format!("lost track of tool process: {:#}", e);
            return Ok(finish(original_size, ConversionOutcome::ToolFailed { reason }, 0));
        }
    };
    let pages = pages.load(Ordering::Relaxed);

    let outcome = match exit {
        ToolExit::Cancelled => return Err(BatchError::Interrupted),
        ToolExit::TimedOut { after } => {
            warn!(task = %task.id, input = %task.input.display(), deadline_secs = after.as_secs(), "Conversion timed out");
            ConversionOutcome::TimedOut { deadline: after }
        }
        ToolExit::Exited { status, stderr } => {
            log_external_tool(TOOL_NAME, &command_line, status.code(), started.elapsed(), &stderr);

            if !status.success() {
                let tail = tail_lines(&stderr, REASON_LINES);
                let reason = match (status.code(), tail.is_empty()) {
                    (Some(code), true) => format!("exit status {}", code),
                    (Some(code), false) => format!("exit status {}: {}", code, tail),
                    (None, _) => "terminated by signal".to_string(),
                };
                ConversionOutcome::ToolFailed { reason }
            } else {
                match fs::metadata(&artifact).map(|m| m.len()) {
                    Ok(new_size) if new_size > 0 => {
                        info!(
                            task = %task.id,
                            input = %task.input.display(),
                            original_size,
                            new_size,
                            pages,
                            "Conversion finished"
                        );
                        ConversionOutcome::Succeeded { artifact, new_size }
                    }
                    _ => ConversionOutcome::ToolFailed {
                        reason: "tool produced no output".to_string(),
                    },
                }
            }
        }
    };

    Ok(finish(original_size, outcome, pages))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::task::build_tasks;
    use crate::test_support::{stub_invocation, write_input};
    use tempfile::TempDir;

    fn single_task(dir: &TempDir, script: &str) -> TaskDescriptor {
        let input = write_input(dir.path(), "doc.pdf", 1000);
        build_tasks(vec![input], stub_invocation(script)).remove(0)
    }

    #[test]
    fn test_success_produces_artifact() {
        let dir = TempDir::new().unwrap();
        let task = single_task(&dir, r#"head -c 700 "$1" > "$2""#);

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        assert_eq!(result.original_size, 1000);
        let artifact_path = match &result.outcome {
            ConversionOutcome::Succeeded { artifact, new_size } => {
                assert_eq!(*new_size, 700);
                assert!(artifact.exists());
                artifact.to_path_buf()
            }
            other => panic!("unexpected outcome: {:?}", other),
        };

        drop(result);
        assert!(!artifact_path.exists());
    }

    #[test]
    fn test_nonzero_exit_is_tool_failed_with_stderr() {
        let dir = TempDir::new().unwrap();
        let task = single_task(&dir, "echo 'Error: /syntaxerror' >&2; exit 3");

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        match result.outcome {
            ConversionOutcome::ToolFailed { reason } => {
                assert!(reason.contains("exit status 3"), "{}", reason);
                assert!(reason.contains("syntaxerror"), "{}", reason);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_empty_output_is_tool_failed() {
        let dir = TempDir::new().unwrap();
        let task = single_task(&dir, "exit 0");

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        assert!(matches!(
            result.outcome,
            ConversionOutcome::ToolFailed { ref reason } if reason.contains("no output")
        ));
    }

    #[test]
    fn test_deadline_kills_and_discards_partial_output() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("artifact-path");
        let script = format!(
            r#"printf '%s' "$2" > '{}'; head -c 10 "$1" > "$2"; sleep 5"#,
            marker.display()
        );
        let task = single_task(&dir, &script);

        let start = Instant::now();
        let result = convert(&task, Some(Duration::from_millis(500)), &CancelToken::new()).unwrap();
        assert!(start.elapsed() < Duration::from_secs(4));
        assert!(matches!(result.outcome, ConversionOutcome::TimedOut { .. }));

        drop(result);
        let artifact = std::fs::read_to_string(&marker).unwrap();
        assert!(!std::path::Path::new(&artifact).exists());
    }

    #[test]
    fn test_pages_are_counted() {
        let dir = TempDir::new().unwrap();
        let task = single_task(&dir, r#"echo 'Page 1'; echo 'Page 2'; head -c 10 "$1" > "$2""#);

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        assert!(result.outcome.is_success());
        assert_eq!(result.pages, 2);
    }

    #[test]
    fn test_missing_input_is_tool_failed() {
        let dir = TempDir::new().unwrap();
        let task = build_tasks(
            vec![dir.path().join("gone.pdf")],
            stub_invocation(r#"cp "$1" "$2""#),
        )
        .remove(0);

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        assert!(matches!(result.outcome, ConversionOutcome::ToolFailed { .. }));
    }

    #[test]
    fn test_missing_program_is_tool_failed() {
        let dir = TempDir::new().unwrap();
        let input = write_input(dir.path(), "doc.pdf", 10);
        let invocation = crate::task::ToolInvocation::new("definitely-not-gs-xyz").input();
        let task = build_tasks(vec![input], invocation).remove(0);

        let result = convert(&task, None, &CancelToken::new()).unwrap();
        assert!(matches!(
            result.outcome,
            ConversionOutcome::ToolFailed { ref reason } if reason.contains("failed to launch")
        ));
    }

    #[test]
    fn test_cancelled_before_start_is_not_launched() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ran");
        let task = single_task(&dir, &format!("touch '{}'", marker.display()));

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(convert(&task, None, &token), Err(BatchError::Interrupted)));
        assert!(!marker.exists());
    }
}
