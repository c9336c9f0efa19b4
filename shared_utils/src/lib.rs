//! Shared Utilities for gs-batch
//!
//! Building blocks that are not specific to PDF conversion:
//! - Input discovery (directory walking, extension filtering)
//! - External tool supervision with deadlines and cancellation
//! - Ctrl-C to cancel-token wiring
//! - I/O error classification for retry prompts
//! - Logging, progress bars and worker pool sizing

pub mod batch;
pub mod cancel;
pub mod common_utils;
pub mod error_handler;
pub mod logging;
pub mod progress;
pub mod thread_manager;
pub mod tool_process;
pub mod types;

pub use batch::{collect_files, collect_inputs, Discovery, PDF_EXTENSIONS};
pub use cancel::{install_interrupt_handler, CancelToken};
pub use common_utils::{format_command_line, get_extension_lowercase, has_extension, tail_lines};
pub use error_handler::{classify_io_error, install_panic_handler, is_recoverable, report_error, ErrorCategory};
pub use logging::{init_logging, log_external_tool, LogConfig};
pub use progress::{create_progress_bar, format_bytes, format_duration, human_readable_size};
pub use thread_manager::{calculate_optimal_threads, get_optimal_threads, ThreadConfig};
pub use tool_process::{ToolExit, ToolProcess};
pub use types::FileSize;
