//! Cancellation Module
//!
//! A cloneable flag shared between the Ctrl-C handler and everything that
//! waits on a child process. Setting it never blocks; checking it is a
//! single atomic load, so worker loops poll it between `try_wait` calls.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Route SIGINT / Ctrl-C into `token`.
///
/// The process keeps running after the signal; callers observe the token and
/// unwind on their own (terminating children first). A second Ctrl-C is only
/// logged. Can be installed once per process.
pub fn install_interrupt_handler(token: &CancelToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        if token.is_cancelled() {
            warn!("Interrupt received again, still shutting down");
        } else {
            eprintln!("\n⚠️  Interrupt received, terminating running conversions...");
            token.cancel();
        }
    })
    .context("Failed to install Ctrl-C handler")
}
