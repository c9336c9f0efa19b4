//! Batch configuration.

use crate::error::{BatchError, Result};
use serde::Serialize;
use std::time::Duration;

/// Per-file deadline used when none is given.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeepPolicy {
    /// Keep whichever of original and new is smaller (ties keep the original).
    #[default]
    KeepSmaller,
    /// Always keep the new file.
    KeepNew,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Worker pool size.
    pub jobs: usize,
    /// `None` disables the per-file deadline.
    pub deadline: Option<Duration>,
    pub keep_policy: KeepPolicy,
    /// Standing permission to overwrite originals in place.
    pub allow_overwrite: bool,
    pub show_progress: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: shared_utils::get_optimal_threads(),
            deadline: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            keep_policy: KeepPolicy::default(),
            allow_overwrite: false,
            show_progress: true,
        }
    }
}

impl BatchConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Zero seconds means no deadline.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.deadline = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_keep_policy(mut self, policy: KeepPolicy) -> Self {
        self.keep_policy = policy;
        self
    }

    pub fn with_allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn with_show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(BatchError::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.deadline == Some(Duration::ZERO) {
            return Err(BatchError::InvalidConfig(
                "deadline must be positive; use no deadline instead of zero".to_string(),
            ));
        }
        Ok(())
    }
}
