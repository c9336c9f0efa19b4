use std::io;
use thiserror::Error;

/// Errors that end a batch as a whole.
///
/// Per-file problems never show up here: they become outcomes in the report.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Ghostscript not found: {0}")]
    ToolNotFound(String),

    #[error("Batch interrupted")]
    Interrupted,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No input files to process")]
    NoInputs,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;
