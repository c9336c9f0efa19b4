//! Retry / skip / abort protocol for file-system errors during finalization.
//!
//! ```text
//! attempt -> ok
//! attempt -> recoverable -> prompt -> retry -> attempt   (unbounded)
//!                                  -> skip  -> task fails
//!                                  -> abort -> batch stops
//! attempt -> fatal -> task fails, no prompt
//! ```

use console::{style, Term};
use serde::Serialize;
use shared_utils::{classify_io_error, ErrorCategory};
use std::fmt;
use std::io::{self, IsTerminal};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryDecision {
    Retry,
    Skip,
    Abort,
}

impl fmt::Display for RecoveryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryDecision::Retry => write!(f, "retry"),
            RecoveryDecision::Skip => write!(f, "skip"),
            RecoveryDecision::Abort => write!(f, "abort"),
        }
    }
}

/// Asked once per recoverable failure.
pub trait RecoveryPrompt {
    fn decide(&mut self, file: &Path, error: &io::Error) -> RecoveryDecision;
}

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("{0}")]
    Fatal(io::Error),

    #[error("skipped after error: {0}")]
    Skipped(io::Error),

    #[error("aborted after error: {0}")]
    Aborted(io::Error),
}

impl RecoveryError {
    pub fn io_error(&self) -> &io::Error {
        match self {
            RecoveryError::Fatal(e) | RecoveryError::Skipped(e) | RecoveryError::Aborted(e) => e,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or the prompt gives up.
///
/// `file` is what the prompt shows; `action` names the operation in logs.
pub fn with_recovery<T, F>(
    file: &Path,
    action: &str,
    prompt: &mut dyn RecoveryPrompt,
    mut op: F,
) -> Result<T, RecoveryError>
where
    F: FnMut() -> io::Result<T>,
{
    let mut attempt = 1usize;
    loop {
        let error = match op() {
            Ok(value) => {
                if attempt > 1 {
                    info!(file = %file.display(), action, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if classify_io_error(&error) == ErrorCategory::Fatal {
            warn!(file = %file.display(), action, error = %error, "Fatal file-system error");
            return Err(RecoveryError::Fatal(error));
        }

        let decision = prompt.decide(file, &error);
        warn!(
            file = %file.display(),
            action,
            attempt,
            error = %error,
            decision = %decision,
            "Recoverable file-system error"
        );
        match decision {
            RecoveryDecision::Retry => attempt += 1,
            RecoveryDecision::Skip => return Err(RecoveryError::Skipped(error)),
            RecoveryDecision::Abort => return Err(RecoveryError::Aborted(error)),
        }
    }
}

/// `r`/`retry`, `s`/`skip`, `a`/`abort`, any case.
pub fn parse_decision(answer: &str) -> Option<RecoveryDecision> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" => Some(RecoveryDecision::Retry),
        "s" | "skip" => Some(RecoveryDecision::Skip),
        "a" | "abort" => Some(RecoveryDecision::Abort),
        _ => None,
    }
}

/// True when a human can both see a prompt on stderr and answer on stdin.
pub fn terminal_attended() -> bool {
    std::io::stdin().is_terminal() && Term::stderr().is_term()
}

/// Asks on the terminal (stderr), re-asking until the answer parses.
///
/// An empty answer, end of input, or a terminal that is not interactive
/// count as skip.
#[derive(Debug)]
pub struct TerminalPrompt {
    term: Term,
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::with_term(Term::stderr())
    }
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_term(term: Term) -> Self {
        Self { term }
    }
}

impl RecoveryPrompt for TerminalPrompt {
    fn decide(&mut self, file: &Path, error: &io::Error) -> RecoveryDecision {
        let _ = self.term.write_line(&format!(
            "\n{} {}\n   {}",
            style("⚠️  Cannot write").yellow().bold(),
            style(file.display()).bold(),
            error
        ));
        if !self.term.is_term() {
            warn!(file = %file.display(), "No interactive terminal, skipping file");
            return RecoveryDecision::Skip;
        }
        loop {
            let _ = self.term.write_str("   [R]etry / [S]kip this file / [A]bort the batch? (s) ");
            match self.term.read_line() {
                Ok(answer) if answer.trim().is_empty() => return RecoveryDecision::Skip,
                Ok(answer) => {
                    if let Some(decision) = parse_decision(&answer) {
                        return decision;
                    }
                    let _ = self.term.write_line("   Please answer r, s or a.");
                }
                Err(e) => {
                    warn!(error = %e, "Cannot read answer from terminal, skipping file");
                    return RecoveryDecision::Skip;
                }
            }
        }
    }
}

/// Fixed answer for unattended runs. Retrying without a human would spin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnattendedPolicy {
    Skip,
    Abort,
}

impl RecoveryPrompt for UnattendedPolicy {
    fn decide(&mut self, file: &Path, error: &io::Error) -> RecoveryDecision {
        let decision = match self {
            UnattendedPolicy::Skip => RecoveryDecision::Skip,
            UnattendedPolicy::Abort => RecoveryDecision::Abort,
        };
        warn!(file = %file.display(), error = %error, decision = %decision, "Unattended recovery");
        decision
    }
}
