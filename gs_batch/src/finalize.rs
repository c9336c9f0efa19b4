//! Serial finalization of conversion results.
//!
//! Runs on the calling thread after the worker pool has drained, one task at
//! a time, so the recovery prompt can talk to a human. Each successful
//! conversion is resolved to a destination, the keep policy picks original
//! or new bytes, and the file-system mutation runs under the retry protocol.
//! An abort stops the loop; files already finalized stay as they are.

use crate::config::KeepPolicy;
use crate::fs::Filesystem;
use crate::naming::{is_in_place, OutputNamer};
use crate::recovery::{with_recovery, RecoveryError, RecoveryPrompt};
use crate::task::TaskId;
use crate::worker::{ConversionOutcome, ConversionResult};
use serde::Serialize;
use shared_utils::CancelToken;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeptVariant {
    Original,
    New,
}

impl KeptVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeptVariant::Original => "original",
            KeptVariant::New => "new",
        }
    }
}

/// What the keep policy asks for, before the overwrite permission is applied.
pub fn decide_keep(policy: KeepPolicy, original_size: u64, new_size: u64) -> KeptVariant {
    match policy {
        KeepPolicy::KeepNew => KeptVariant::New,
        KeepPolicy::KeepSmaller if new_size < original_size => KeptVariant::New,
        KeepPolicy::KeepSmaller => KeptVariant::Original,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FailureReason {
    ToolFailed { message: String },
    TimedOut { deadline_secs: u64 },
    Filesystem { message: String },
    Skipped { message: String },
    Aborted { message: String },
}

impl FailureReason {
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::ToolFailed { .. } => "tool-failed",
            FailureReason::TimedOut { .. } => "timeout",
            FailureReason::Filesystem { .. } => "filesystem",
            FailureReason::Skipped { .. } => "skipped",
            FailureReason::Aborted { .. } => "aborted",
        }
    }

    pub fn message(&self) -> String {
        match self {
            FailureReason::TimedOut { deadline_secs } => {
                format!("no result within {}s, tool killed", deadline_secs)
            }
            FailureReason::ToolFailed { message }
            | FailureReason::Filesystem { message }
            | FailureReason::Skipped { message }
            | FailureReason::Aborted { message } => message.clone(),
        }
    }

    fn from_recovery(error: RecoveryError) -> Self {
        let message = error.io_error().to_string();
        match error {
            RecoveryError::Fatal(_) => FailureReason::Filesystem { message },
            RecoveryError::Skipped(_) => FailureReason::Skipped { message },
            RecoveryError::Aborted(_) => FailureReason::Aborted { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizedFile {
    pub kept: KeptVariant,
    pub new_size: u64,
    pub final_size: u64,
    pub in_place: bool,
    /// Keep-new was wanted in place but overwriting was not allowed.
    pub overwrite_refused: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TaskOutcome {
    Finalized(FinalizedFile),
    Failed { reason: FailureReason },
    /// Left over after an abort or interrupt.
    NotAttempted,
}

/// Terminal record for one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub input: PathBuf,
    pub destination: Option<PathBuf>,
    pub original_size: u64,
    pub elapsed_secs: f64,
    pub pages: usize,
    pub outcome: TaskOutcome,
}

impl TaskReport {
    fn new(result: &ConversionResult, destination: Option<PathBuf>, outcome: TaskOutcome) -> Self {
        Self {
            task_id: result.task_id,
            input: result.input.clone(),
            destination,
            original_size: result.original_size,
            elapsed_secs: result.elapsed.as_secs_f64(),
            pages: result.pages,
            outcome,
        }
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.outcome, TaskOutcome::Finalized(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeConfig {
    pub keep_policy: KeepPolicy,
    pub allow_overwrite: bool,
}

#[derive(Debug)]
pub struct FinalizationRun {
    /// One per conversion result, in task order.
    pub reports: Vec<TaskReport>,
    pub aborted: bool,
    pub interrupted: bool,
}

pub struct Finalizer<'a> {
    namer: &'a dyn OutputNamer,
    fs: &'a dyn Filesystem,
    prompt: &'a mut dyn RecoveryPrompt,
    config: FinalizeConfig,
    cancel: CancelToken,
}

enum Step {
    Continue(TaskReport),
    Abort(TaskReport),
}

impl<'a> Finalizer<'a> {
    pub fn new(
        namer: &'a dyn OutputNamer,
        fs: &'a dyn Filesystem,
        prompt: &'a mut dyn RecoveryPrompt,
        config: FinalizeConfig,
    ) -> Self {
        Self {
            namer,
            fs,
            prompt,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Stop before the next task once `cancel` fires.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn finalize_all(&mut self, mut results: Vec<ConversionResult>) -> FinalizationRun {
        results.sort_by_key(|r| r.task_id);

        let mut reports = Vec::with_capacity(results.len());
        let mut aborted = false;
        let mut interrupted = false;
        let mut pending = results.into_iter();

        for result in pending.by_ref() {
            if self.cancel.is_cancelled() {
                warn!(task = %result.task_id, "Interrupted, leaving remaining tasks untouched");
                interrupted = true;
                aborted = true;
                reports.push(TaskReport::new(&result, None, TaskOutcome::NotAttempted));
                break;
            }

            match self.finalize_one(result) {
                Step::Continue(report) => reports.push(report),
                Step::Abort(report) => {
                    warn!(task = %report.task_id, "Batch aborted by operator");
                    reports.push(report);
                    aborted = true;
                    break;
                }
            }
        }

        // dropping the results releases their temporary artifacts
        reports.extend(
            pending.map(|result| TaskReport::new(&result, None, TaskOutcome::NotAttempted)),
        );

        FinalizationRun {
            reports,
            aborted,
            interrupted,
        }
    }

    fn finalize_one(&mut self, mut result: ConversionResult) -> Step {
        let outcome = std::mem::replace(
            &mut result.outcome,
            ConversionOutcome::ToolFailed {
                reason: String::new(),
            },
        );
        let destination = self.namer.destination(&result.input);

        let (artifact, new_size) = match outcome {
            ConversionOutcome::ToolFailed { reason } => {
                let reason = FailureReason::ToolFailed { message: reason };
                return Step::Continue(self.failed(&result, destination.ok(), reason));
            }
            ConversionOutcome::TimedOut { deadline } => {
                let reason = FailureReason::TimedOut {
                    deadline_secs: deadline.as_secs(),
                };
                return Step::Continue(self.failed(&result, destination.ok(), reason));
            }
            ConversionOutcome::Succeeded { artifact, new_size } => (artifact, new_size),
        };

        let destination = match destination {
            Ok(d) => d,
            Err(e) => {
                let reason = FailureReason::Filesystem {
                    message: e.to_string(),
                };
                return Step::Continue(self.failed(&result, None, reason));
            }
        };

        let in_place = is_in_place(&result.input, &destination);
        let mut kept = decide_keep(self.config.keep_policy, result.original_size, new_size);
        let mut overwrite_refused = false;
        if kept == KeptVariant::New && in_place && !self.config.allow_overwrite {
            warn!(
                input = %result.input.display(),
                "Refusing to overwrite original without permission, keeping it"
            );
            kept = KeptVariant::Original;
            overwrite_refused = true;
        }

        match self.apply(&result.input, &destination, artifact, kept, in_place) {
            Ok(()) => {
                let final_size = match kept {
                    KeptVariant::New => new_size,
                    KeptVariant::Original => result.original_size,
                };
                info!(
                    task = %result.task_id,
                    destination = %destination.display(),
                    kept = kept.as_str(),
                    original_size = result.original_size,
                    new_size,
                    "Finalized"
                );
                let finalized = FinalizedFile {
                    kept,
                    new_size,
                    final_size,
                    in_place,
                    overwrite_refused,
                };
                Step::Continue(TaskReport::new(
                    &result,
                    Some(destination),
                    TaskOutcome::Finalized(finalized),
                ))
            }
            Err(error) => {
                let abort = matches!(error, RecoveryError::Aborted(_));
                let report = self.failed(&result, Some(destination), FailureReason::from_recovery(error));
                if abort {
                    Step::Abort(report)
                } else {
                    Step::Continue(report)
                }
            }
        }
    }

    /// Perform the file-system side of one decision. `artifact` is consumed
    /// here; dropping it deletes whatever is still at its path, including a
    /// source left behind by a cross-device move.
    fn apply(
        &mut self,
        input: &Path,
        destination: &Path,
        artifact: TempPath,
        kept: KeptVariant,
        in_place: bool,
    ) -> Result<(), RecoveryError> {
        if kept == KeptVariant::Original && in_place {
            debug!(input = %input.display(), "Keeping original in place, nothing to write");
            return Ok(());
        }

        if let Some(parent) = destination.parent() {
            let fs = self.fs;
            with_recovery(parent, "create directory", &mut *self.prompt, || {
                fs.create_dir_all(parent)
            })?;
        }

        let fs = self.fs;
        match kept {
            KeptVariant::Original => {
                with_recovery(destination, "copy original", &mut *self.prompt, || {
                    fs.copy_into_place(input, destination)
                })?;
            }
            KeptVariant::New => {
                with_recovery(destination, "move new file", &mut *self.prompt, || {
                    fs.move_file(&artifact, destination)
                })?;
            }
        }
        Ok(())
    }

    fn failed(
        &self,
        result: &ConversionResult,
        destination: Option<PathBuf>,
        reason: FailureReason,
    ) -> TaskReport {
        warn!(
            task = %result.task_id,
            input = %result.input.display(),
            kind = reason.label(),
            reason = %reason.message(),
            "Task failed"
        );
        TaskReport::new(result, destination, TaskOutcome::Failed { reason })
    }
}
