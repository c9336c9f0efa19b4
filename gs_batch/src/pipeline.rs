//! Two-phase batch: parallel conversion, then serial finalization.

use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::finalize::{FinalizeConfig, Finalizer};
use crate::fs::{Filesystem, LocalFs};
use crate::naming::OutputNamer;
use crate::pool::run_conversions;
use crate::recovery::RecoveryPrompt;
use crate::report::BatchReport;
use crate::task::{build_tasks, ToolInvocation};
use chrono::Local;
use shared_utils::{create_progress_bar, format_duration, CancelToken};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

pub struct BatchRunner<'a> {
    config: BatchConfig,
    namer: &'a dyn OutputNamer,
    fs: &'a dyn Filesystem,
    cancel: CancelToken,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: BatchConfig, namer: &'a dyn OutputNamer) -> Self {
        Self {
            config,
            namer,
            fs: &LocalFs,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_filesystem(mut self, fs: &'a dyn Filesystem) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Convert every input, then finalize the results one by one.
    ///
    /// Per-file failures end up in the report. Only configuration problems
    /// and an interrupt during conversion are returned as errors.
    pub fn run(
        &self,
        inputs: Vec<PathBuf>,
        invocation: ToolInvocation,
        prompt: &mut dyn RecoveryPrompt,
    ) -> Result<BatchReport> {
        self.config.validate()?;
        if inputs.is_empty() {
            return Err(BatchError::NoInputs);
        }

        let started_at = Local::now();
        let clock = Instant::now();
        let tasks = build_tasks(inputs, invocation);
        info!(
            files = tasks.len(),
            jobs = self.config.jobs,
            deadline_secs = self.config.deadline.map(|d| d.as_secs()),
            "Batch started"
        );

        let progress = create_progress_bar(tasks.len() as u64, "Converting", self.config.show_progress);
        let results = match run_conversions(tasks, &self.config, &self.cancel, &progress) {
            Ok(results) => results,
            Err(e) => {
                progress.abandon_with_message("Interrupted");
                return Err(e);
            }
        };
        // off the screen before any prompt can appear
        progress.finish_and_clear();

        let finalize_config = FinalizeConfig {
            keep_policy: self.config.keep_policy,
            allow_overwrite: self.config.allow_overwrite,
        };
        let run = Finalizer::new(self.namer, self.fs, prompt, finalize_config)
            .with_cancel(self.cancel.clone())
            .finalize_all(results);

        let report = BatchReport::from_run(run).with_timing(started_at, clock.elapsed());
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            not_attempted = report.not_attempted,
            aborted = report.aborted,
            elapsed = %format_duration(clock.elapsed()),
            "Batch finished"
        );
        Ok(report)
    }
}
