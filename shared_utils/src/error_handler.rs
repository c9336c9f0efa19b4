//! Unified Error Handler Module
//!
//! ## Error categories
//! - Recoverable: transient, operator-fixable file-system condition (a locked
//!   destination, a full disk, a directory the user can make writable).
//!   Worth asking a human whether to retry.
//! - Fatal: anything else. Retrying without changing inputs cannot help.
//!
//! ## Error reporting
//! - `report_error()`: error chain to stderr and to the log
//! - `install_panic_handler()`: log panics before the default hook runs

use std::fmt;
use std::io;
use std::panic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    Fatal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Recoverable => write!(f, "RECOVERABLE"),
            ErrorCategory::Fatal => write!(f, "FATAL"),
        }
    }
}

#[cfg(unix)]
const RECOVERABLE_OS_CODES: &[i32] = &[
    libc::EBUSY,   // resource busy / locked
    libc::ETXTBSY, // file in use
    libc::EAGAIN,  // lock held (flock/fcntl with non-blocking)
    libc::ENOSPC,  // disk full
    libc::EDQUOT,  // quota exceeded
    libc::EACCES,  // permission denied
    libc::EPERM,   // operation not permitted
];

#[cfg(windows)]
const RECOVERABLE_OS_CODES: &[i32] = &[
    5,    // ERROR_ACCESS_DENIED
    32,   // ERROR_SHARING_VIOLATION
    33,   // ERROR_LOCK_VIOLATION
    39,   // ERROR_HANDLE_DISK_FULL
    112,  // ERROR_DISK_FULL
    1816, // ERROR_NOT_ENOUGH_QUOTA
];

#[cfg(not(any(unix, windows)))]
const RECOVERABLE_OS_CODES: &[i32] = &[];

/// Sort an I/O error into the retry protocol's two classes.
pub fn classify_io_error(error: &io::Error) -> ErrorCategory {
    if let Some(code) = error.raw_os_error() {
        return if RECOVERABLE_OS_CODES.contains(&code) {
            ErrorCategory::Recoverable
        } else {
            ErrorCategory::Fatal
        };
    }

    match error.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock => ErrorCategory::Recoverable,
        _ => ErrorCategory::Fatal,
    }
}

pub fn is_recoverable(error: &io::Error) -> bool {
    classify_io_error(error) == ErrorCategory::Recoverable
}

pub fn report_error<E: std::error::Error + ?Sized>(error: &E) {
    eprintln!("🔥 ERROR: {}", error);

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        eprintln!("   {}. Caused by: {}", level, err);
        source = err.source();
        level += 1;
    }

    tracing::error!("Error occurred: {}", error);

    let mut source = error.source();
    let mut level = 1;
    while let Some(err) = source {
        tracing::error!("  Caused by (level {}): {}", level, err);
        source = err.source();
        level += 1;
    }
}

pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = if let Some(loc) = panic_info.location() {
            format!("{}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            "Unknown location".to_string()
        };

        eprintln!("💥 PANIC occurred!");
        eprintln!("   Message: {}", message);
        eprintln!("   Location: {}", location);
        eprintln!("   This is a bug! Please report it.");

        tracing::error!("PANIC: {} at {}", message, location);

        default_hook(panic_info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_recoverable() {
        let error = io::Error::new(io::ErrorKind::PermissionDenied, "destination locked");
        assert_eq!(classify_io_error(&error), ErrorCategory::Recoverable);
    }

    #[test]
    fn test_not_found_is_fatal() {
        let error = io::Error::new(io::ErrorKind::NotFound, "missing");
        assert_eq!(classify_io_error(&error), ErrorCategory::Fatal);
    }

    #[test]
    fn test_invalid_input_is_fatal() {
        let error = io::Error::new(io::ErrorKind::InvalidInput, "malformed path");
        assert!(!is_recoverable(&error));
    }

    #[cfg(unix)]
    #[test]
    fn test_raw_os_codes() {
        for code in [libc::EBUSY, libc::ENOSPC, libc::EDQUOT, libc::EACCES] {
            let error = io::Error::from_raw_os_error(code);
            assert_eq!(
                classify_io_error(&error),
                ErrorCategory::Recoverable,
                "code {} should be recoverable",
                code
            );
        }
        for code in [libc::ENOENT, libc::EINVAL, libc::ENAMETOOLONG, libc::EISDIR] {
            let error = io::Error::from_raw_os_error(code);
            assert_eq!(
                classify_io_error(&error),
                ErrorCategory::Fatal,
                "code {} should be fatal",
                code
            );
        }
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(format!("{}", ErrorCategory::Recoverable), "RECOVERABLE");
        assert_eq!(format!("{}", ErrorCategory::Fatal), "FATAL");
    }

    #[test]
    fn test_report_error_chain() {
        let outer: Box<dyn std::error::Error> =
            Box::new(io::Error::other("outer error with inner cause"));
        report_error(outer.as_ref());
    }

    #[test]
    fn test_install_panic_handler() {
        install_panic_handler();
    }
}
