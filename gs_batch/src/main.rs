use anyhow::Context;
use clap::{Parser, ValueEnum};
use console::{style, Term};
use gs_batch::ghostscript::{self, CompressPreset, InvocationOptions, PdfaLevel};
use gs_batch::{
    build_invocation, AffixNamer, BatchConfig, BatchError, BatchReport, BatchRunner, KeepPolicy,
    OutputNamer, RecoveryPrompt, TerminalPrompt, UnattendedPolicy, DEFAULT_TIMEOUT_SECS,
};
use gs_batch::recovery::terminal_attended;
use shared_utils::{
    collect_inputs, install_interrupt_handler, install_panic_handler, report_error, CancelToken,
    LogConfig, PDF_EXTENSIONS,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn, Level};

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "gs-batch")]
#[command(version, about = "Batch compress or convert PDFs with Ghostscript", long_about = None)]
struct Cli {
    /// PDF files or folders to process
    #[arg(value_name = "FILES", required = true)]
    files: Vec<PathBuf>,

    /// Raw Ghostscript switches, whitespace separated
    #[arg(long, value_name = "STR", allow_hyphen_values = true)]
    options: Option<String>,

    /// Compression preset (bare flag = ebook)
    #[arg(long, value_name = "PRESET", num_args = 0..=1, require_equals = true, default_missing_value = "ebook")]
    compress: Option<CompressPreset>,

    /// PDF/A version (bare flag = 2); always keeps the new file
    #[arg(long, value_name = "VERSION", num_args = 0..=1, require_equals = true, default_missing_value = "2")]
    pdfa: Option<PdfaLevel>,

    /// Prefix for output names, may contain folders
    #[arg(long, default_value = "")]
    prefix: String,

    /// Suffix inserted before the extension
    #[arg(long, default_value = "")]
    suffix: String,

    /// Destination folder, relative to each input's folder when relative
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Keep whichever file is smaller (default)
    #[arg(long, conflicts_with = "keep_new")]
    keep_smaller: bool,

    /// Always keep the new file
    #[arg(long)]
    keep_new: bool,

    /// Allow overwriting original files
    #[arg(short, long)]
    force: bool,

    /// Parallel Ghostscript processes (default: CPU-derived)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Per-file deadline in seconds, 0 disables it
    #[arg(short, long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// What to do when an output file cannot be written
    #[arg(long, value_enum, default_value = "prompt")]
    on_error: OnError,

    /// Descend into sub-folders (default)
    #[arg(short, long, overrides_with = "no_recursive")]
    recursive: bool,

    /// Only look at the top level of given folders
    #[arg(long, overrides_with = "recursive")]
    no_recursive: bool,

    /// Ghostscript executable
    #[arg(long, value_name = "PATH")]
    gs: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OnError {
    Prompt,
    Skip,
    Abort,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let stderr_level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    let _ = shared_utils::init_logging(
        "gs_batch",
        LogConfig::default()
            .with_level(level)
            .with_stderr_level(stderr_level),
    );
    install_panic_handler();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            if matches!(e.downcast_ref::<BatchError>(), Some(BatchError::Interrupted)) {
                eprintln!("{}", style("Interrupted, no files were changed.").yellow());
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            report_error(AsRef::<dyn std::error::Error + Send + Sync>::as_ref(&e));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let namer = AffixNamer::new(cli.prefix.clone(), cli.suffix.clone(), cli.output_dir.clone());

    let mut allow_overwrite = cli.force;
    if namer.is_identity() && !allow_overwrite {
        if !confirm_overwrite()? {
            println!("Aborting...");
            return Ok(ExitCode::SUCCESS);
        }
        allow_overwrite = true;
    }

    let recursive = cli.recursive || !cli.no_recursive;
    let discovery = collect_inputs(&cli.files, PDF_EXTENSIONS, recursive);
    for path in &discovery.missing {
        eprintln!("{} {}", style("⚠️  Not found, skipping:").yellow(), path.display());
    }
    for path in &discovery.ignored {
        warn!(path = %path.display(), "Not a PDF, ignored");
    }
    if discovery.files.is_empty() {
        return Err(BatchError::NoInputs.into());
    }

    let program = ghostscript::locate(cli.gs.as_deref())?;
    info!(gs = %program.display(), "Using Ghostscript");

    let mut options = InvocationOptions {
        compress: cli.compress,
        pdfa: cli.pdfa,
        raw: Vec::new(),
    };
    if let Some(raw) = &cli.options {
        options = options.with_raw_options(raw);
    }
    let invocation = build_invocation(&program, &options);

    let keep_policy = if options.forces_keep_new() || (cli.keep_new && !cli.keep_smaller) {
        KeepPolicy::KeepNew
    } else {
        KeepPolicy::KeepSmaller
    };

    let mut config = BatchConfig::default()
        .with_timeout_secs(cli.timeout)
        .with_keep_policy(keep_policy)
        .with_allow_overwrite(allow_overwrite)
        .with_show_progress(!cli.quiet && !cli.json);
    if let Some(jobs) = cli.jobs {
        config = config.with_jobs(jobs);
    }

    let cancel = CancelToken::new();
    install_interrupt_handler(&cancel)?;

    let attended = terminal_attended();
    let mut prompt: Box<dyn RecoveryPrompt> = match cli.on_error {
        OnError::Prompt if attended => Box::new(TerminalPrompt::new()),
        OnError::Prompt | OnError::Skip => Box::new(UnattendedPolicy::Skip),
        OnError::Abort => Box::new(UnattendedPolicy::Abort),
    };

    let report = BatchRunner::new(config, &namer)
        .with_cancel(cancel)
        .run(discovery.files, invocation, prompt.as_mut())?;

    present(&report, cli.json)?;
    Ok(exit_code(&report))
}

/// Only an explicit `y` on a terminal grants overwriting.
fn confirm_overwrite() -> anyhow::Result<bool> {
    let term = Term::stderr();
    term.write_line(&format!(
        "{} {}",
        style("**WARNINGS:**").bold().red().reverse(),
        style("Original files may be overwritten if no `--prefix` is specified").bold().red()
    ))?;
    term.write_line(
        &style("(Use the `--force` flag to allow overwriting original files and skip this messages)")
            .dim()
            .to_string(),
    )?;

    if !terminal_attended() {
        return Ok(false);
    }
    term.write_str("Do you want to overwrite original files? [y/n] (n): ")?;
    let answer = term.read_line().context("Failed to read answer")?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn present(report: &BatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print()?;
    }
    Ok(())
}

fn exit_code(report: &BatchReport) -> ExitCode {
    if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_flags_take_their_defaults() {
        let cli = Cli::parse_from(["gs-batch", "--compress", "--pdfa", "a.pdf"]);
        assert_eq!(cli.compress, Some(CompressPreset::Ebook));
        assert_eq!(cli.pdfa.map(|l| l.version()), Some(2));
        assert_eq!(cli.files, vec![PathBuf::from("a.pdf")]);
    }

    #[test]
    fn test_explicit_values() {
        let cli = Cli::parse_from([
            "gs-batch",
            "--compress=screen",
            "--pdfa=3",
            "-j",
            "4",
            "-t",
            "0",
            "--on-error",
            "abort",
            "--options",
            "-dNOPAUSE -dQUIET",
            "x.pdf",
        ]);
        assert_eq!(cli.compress, Some(CompressPreset::Screen));
        assert_eq!(cli.pdfa.map(|l| l.version()), Some(3));
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.timeout, 0);
        assert!(cli.on_error == OnError::Abort);
        assert_eq!(cli.options.as_deref(), Some("-dNOPAUSE -dQUIET"));
    }

    #[test]
    fn test_recursion_defaults_on() {
        let cli = Cli::parse_from(["gs-batch", "dir"]);
        assert!(cli.recursive || !cli.no_recursive);
        let cli = Cli::parse_from(["gs-batch", "--no-recursive", "dir"]);
        assert!(!(cli.recursive || !cli.no_recursive));
    }

    #[test]
    fn test_keep_flags_conflict() {
        assert!(Cli::try_parse_from(["gs-batch", "--keep-new", "--keep-smaller", "a.pdf"]).is_err());
    }

    #[test]
    fn test_files_are_required() {
        assert!(Cli::try_parse_from(["gs-batch"]).is_err());
    }
}
