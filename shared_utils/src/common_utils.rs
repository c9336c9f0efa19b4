//! Common Utilities Module
//!
//! Small path and string helpers used across the workspace:
//! - extension and hidden-file checks for discovery
//! - command-line rendering for logs
//! - tail extraction for tool error output

use std::ffi::OsStr;
use std::path::Path;

/// Lowercase file extension, or an empty string.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("report.PDF")), "pdf");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive extension check (extensions without the dot).
///
/// # Examples
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::has_extension;
///
/// assert!(has_extension(Path::new("scan.PDF"), &["pdf"]));
/// assert!(!has_extension(Path::new("scan.png"), &["pdf"]));
/// ```
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

pub fn is_hidden_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Render a program and its arguments as one shell-like line for logs.
///
/// Arguments containing whitespace are single-quoted. The result is for
/// humans only; nothing ever passes it to a shell.
///
/// # Examples
/// ```
/// use shared_utils::common_utils::format_command_line;
///
/// let line = format_command_line("gs", ["-o", "my file.pdf", "in.pdf"]);
/// assert_eq!(line, "gs -o 'my file.pdf' in.pdf");
/// ```
pub fn format_command_line<I, S>(program: impl AsRef<OsStr>, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut line = program.as_ref().to_string_lossy().into_owned();
    for arg in args {
        let arg = arg.as_ref().to_string_lossy();
        line.push(' ');
        if arg.is_empty() || arg.chars().any(char::is_whitespace) {
            line.push('\'');
            line.push_str(&arg);
            line.push('\'');
        } else {
            line.push_str(&arg);
        }
    }
    line
}

/// Last `max_lines` non-empty lines of `text`, joined with `" | "`.
///
/// # Examples
/// ```
/// use shared_utils::common_utils::tail_lines;
///
/// assert_eq!(tail_lines("a\n\nb\nc\n", 2), "b | c");
/// assert_eq!(tail_lines("", 3), "");
/// ```
pub fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join(" | ")
}
