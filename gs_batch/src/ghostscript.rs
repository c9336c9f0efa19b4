//! Ghostscript lookup and argument construction.
//!
//! The engine treats the tool as opaque; this module is the only place that
//! knows Ghostscript switches.

use crate::error::{BatchError, Result};
use crate::task::ToolInvocation;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[cfg(windows)]
const GS_CANDIDATES: &[&str] = &["gswin64c", "gswin32c"];

#[cfg(not(windows))]
const GS_CANDIDATES: &[&str] = &["gs"];

/// Resolve the Ghostscript executable, honoring an explicit override.
pub fn locate(override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return which::which(path).map_err(|e| {
            BatchError::ToolNotFound(format!("{} ({})", path.display(), e))
        });
    }

    for candidate in GS_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            debug!(path = %path.display(), "Found Ghostscript");
            return Ok(path);
        }
    }

    Err(BatchError::ToolNotFound(format!(
        "none of [{}] is on PATH; install Ghostscript or pass --gs",
        GS_CANDIDATES.join(", ")
    )))
}

/// `-dPDFSETTINGS` presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressPreset {
    Screen,
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl CompressPreset {
    pub const ALL: [CompressPreset; 5] = [
        CompressPreset::Screen,
        CompressPreset::Ebook,
        CompressPreset::Printer,
        CompressPreset::Prepress,
        CompressPreset::Default,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CompressPreset::Screen => "screen",
            CompressPreset::Ebook => "ebook",
            CompressPreset::Printer => "printer",
            CompressPreset::Prepress => "prepress",
            CompressPreset::Default => "default",
        }
    }
}

impl fmt::Display for CompressPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressPreset {
    type Err = String;

    /// Accepts `ebook` as well as Ghostscript's own `/ebook` spelling.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                format!(
                    "unknown preset '{}' (expected one of: screen, ebook, printer, prepress, default)",
                    s
                )
            })
    }
}

/// PDF/A part number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PdfaLevel(u8);

impl PdfaLevel {
    pub fn new(version: u8) -> Option<Self> {
        (1..=3).contains(&version).then_some(Self(version))
    }

    pub fn version(&self) -> u8 {
        self.0
    }
}

impl FromStr for PdfaLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(PdfaLevel::new)
            .ok_or_else(|| format!("invalid PDF/A version '{}' (expected 1, 2 or 3)", s))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvocationOptions {
    pub compress: Option<CompressPreset>,
    pub pdfa: Option<PdfaLevel>,
    /// Extra switches passed through verbatim, before the input path.
    pub raw: Vec<String>,
}

impl InvocationOptions {
    pub fn with_raw_options(mut self, options: &str) -> Self {
        self.raw
            .extend(options.split_whitespace().map(str::to_string));
        self
    }

    /// PDF/A output must replace the original even when it is larger.
    pub fn forces_keep_new(&self) -> bool {
        self.pdfa.is_some()
    }
}

/// `gs -sDEVICE=pdfwrite -o <OUTPUT> [preset] [pdfa] [raw...] <INPUT>`
pub fn build_invocation(program: &Path, options: &InvocationOptions) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(program)
        .arg("-sDEVICE=pdfwrite")
        .arg("-o")
        .output();

    if let Some(preset) = options.compress {
        invocation = invocation.arg(format!("-dPDFSETTINGS=/{}", preset));
    }

    if let Some(level) = options.pdfa {
        invocation = invocation.args([
            "-dPDFACompatibilityPolicy=1".to_string(),
            "-sColorConversionStrategy=RGB".to_string(),
            format!("-dPDFA={}", level.version()),
        ]);
    }

    invocation.args(options.raw.iter().cloned()).input()
}
