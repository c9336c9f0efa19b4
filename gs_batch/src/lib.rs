pub mod config;
pub mod error;
pub mod finalize;
pub mod fs;
pub mod ghostscript;
pub mod naming;
pub mod pipeline;
pub mod pool;
pub mod recovery;
pub mod report;
pub mod task;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::{BatchConfig, KeepPolicy, DEFAULT_TIMEOUT_SECS};
pub use error::{BatchError, Result};
pub use finalize::{
    decide_keep, FailureReason, FinalizationRun, FinalizeConfig, FinalizedFile, Finalizer,
    KeptVariant, TaskOutcome, TaskReport,
};
pub use fs::{Filesystem, LocalFs};
pub use ghostscript::{build_invocation, CompressPreset, InvocationOptions, PdfaLevel};
pub use naming::{AffixNamer, OutputNamer};
pub use pipeline::BatchRunner;
pub use pool::{run_bounded, run_conversions};
pub use recovery::{
    with_recovery, RecoveryDecision, RecoveryError, RecoveryPrompt, TerminalPrompt,
    UnattendedPolicy,
};
pub use report::{BatchReport, SizeStats};
pub use task::{build_tasks, TaskDescriptor, TaskId, ToolInvocation};
pub use worker::{convert, ConversionOutcome, ConversionResult};
