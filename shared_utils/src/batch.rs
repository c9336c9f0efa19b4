//! Batch Input Discovery
//!
//! Turns the paths given on the command line into the ordered list of input
//! files a batch works on: directories are walked, files are filtered by
//! extension, everything is made absolute and de-duplicated.

use crate::common_utils::{has_extension, is_hidden_file};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// Files under `dir` with a matching extension, sorted by path.
pub fn collect_files(dir: &Path, extensions: &[&str], recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    walker
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_file(e.path()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| has_extension(e.path(), extensions))
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Absolute input files, in command-line order, without duplicates.
    pub files: Vec<PathBuf>,
    /// Paths that do not exist.
    pub missing: Vec<PathBuf>,
    /// Files given explicitly whose extension does not match.
    pub ignored: Vec<PathBuf>,
}

/// Resolve command-line paths into batch inputs.
pub fn collect_inputs(paths: &[PathBuf], extensions: &[&str], recursive: bool) -> Discovery {
    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    for path in paths {
        let candidates = if path.is_dir() {
            collect_files(path, extensions, recursive)
        } else if path.is_file() {
            if has_extension(path, extensions) {
                vec![path.clone()]
            } else {
                warn!(path = %path.display(), "Ignoring file with unsupported extension");
                discovery.ignored.push(path.clone());
                continue;
            }
        } else {
            warn!(path = %path.display(), "Input path does not exist");
            discovery.missing.push(path.clone());
            continue;
        };

        for file in candidates {
            let absolute = std::path::absolute(&file).unwrap_or(file);
            if seen.insert(absolute.clone()) {
                discovery.files.push(absolute);
            } else {
                debug!(path = %absolute.display(), "Skipping duplicate input");
            }
        }
    }

    discovery
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"%PDF-1.4").unwrap();
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("b.pdf"));
        touch(&temp.path().join("a.PDF"));
        touch(&temp.path().join("notes.txt"));
        touch(&temp.path().join("sub/c.pdf"));

        let flat = collect_files(temp.path(), PDF_EXTENSIONS, false);
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);

        let deep = collect_files(temp.path(), PDF_EXTENSIONS, true);
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn test_collect_files_skips_hidden() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join(".hidden.pdf"));
        touch(&temp.path().join(".cache/inner.pdf"));
        touch(&temp.path().join("visible.pdf"));

        let files = collect_files(temp.path(), PDF_EXTENSIONS, true);
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("visible.pdf"));
    }

    #[test]
    fn test_collect_inputs_dedups_and_reports() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.pdf");
        let txt = temp.path().join("a.txt");
        touch(&a);
        touch(&txt);

        let discovery = collect_inputs(
            &[
                a.clone(),
                temp.path().to_path_buf(),
                txt.clone(),
                temp.path().join("missing.pdf"),
            ],
            PDF_EXTENSIONS,
            true,
        );

        assert_eq!(discovery.files.len(), 1);
        assert!(discovery.files[0].is_absolute());
        assert_eq!(discovery.ignored, vec![txt]);
        assert_eq!(discovery.missing.len(), 1);
    }

    #[test]
    fn test_collect_inputs_preserves_order() {
        let temp = TempDir::new().unwrap();
        let z = temp.path().join("z.pdf");
        let a = temp.path().join("a.pdf");
        touch(&z);
        touch(&a);

        let discovery = collect_inputs(&[z.clone(), a.clone()], PDF_EXTENSIONS, false);
        assert!(discovery.files[0].ends_with("z.pdf"));
        assert!(discovery.files[1].ends_with("a.pdf"));
    }
}
