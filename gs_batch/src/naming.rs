//! Destination naming.
//!
//! Pure path arithmetic: nothing here touches the file system beyond reading
//! the current directory to make relative inputs absolute.

use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Maps an input file to the path its result is written to.
pub trait OutputNamer: Send + Sync {
    fn destination(&self, input: &Path) -> io::Result<PathBuf>;

    /// True when every input maps onto itself.
    fn is_identity(&self) -> bool {
        false
    }
}

/// `base / (prefix + stem + suffix + ext)`.
///
/// `base` is the input's folder, or `output_dir` (resolved against the input's
/// folder when relative). A path-like prefix such as `out/` lands in a
/// sub-folder of `base`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffixNamer {
    pub prefix: String,
    pub suffix: String,
    pub output_dir: Option<PathBuf>,
}

impl AffixNamer {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>, output_dir: Option<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            output_dir,
        }
    }
}

impl OutputNamer for AffixNamer {
    fn destination(&self, input: &Path) -> io::Result<PathBuf> {
        if input.file_name().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("input has no file name: {}", input.display()),
            ));
        }

        let stem = input.file_stem().unwrap_or_default();
        let mut name = OsString::from(&self.prefix);
        name.push(stem);
        name.push(&self.suffix);
        if let Some(ext) = input.extension() {
            name.push(".");
            name.push(ext);
        }

        let folder = input.parent().unwrap_or(Path::new(""));
        let base = match &self.output_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => folder.join(dir),
            None => folder.to_path_buf(),
        };

        absolute_normalized(&base.join(name))
    }

    fn is_identity(&self) -> bool {
        self.prefix.is_empty() && self.suffix.is_empty() && self.output_dir.is_none()
    }
}

/// Make `path` absolute, then resolve `.` and `..` lexically.
pub fn absolute_normalized(path: &Path) -> io::Result<PathBuf> {
    let path = if path.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        std::path::absolute(path)?
    };
    Ok(normalize(&path))
}

/// Lexical normalization; symlinks are not consulted.
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use gs_batch::naming::normalize;
///
/// assert_eq!(normalize(Path::new("/a/./b/../c.pdf")), PathBuf::from("/a/c.pdf"));
/// ```
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True when `destination` names the input file itself.
pub fn is_in_place(input: &Path, destination: &Path) -> bool {
    match absolute_normalized(input) {
        Ok(input) => input == destination,
        Err(_) => input == destination,
    }
}
