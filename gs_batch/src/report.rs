//! Batch report: aggregation (pure) and terminal rendering.

use crate::finalize::{FinalizationRun, TaskOutcome, TaskReport};
use chrono::{DateTime, Local};
use console::style;
use serde::Serialize;
use shared_utils::{format_bytes, format_duration, human_readable_size, FileSize};
use std::io::{self, Write};
use std::time::Duration;

const COLUMN_WIDTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SizeStats {
    pub total_original: FileSize,
    pub total_final: FileSize,
    pub saved: FileSize,
    /// total_final / total_original
    pub overall_ratio: Option<f64>,
    /// Per-file new / original, over finalized files.
    pub mean_ratio: Option<f64>,
    pub best_ratio: Option<f64>,
    pub worst_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: Option<DateTime<Local>>,
    pub elapsed_secs: f64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub aborted: bool,
    pub interrupted: bool,
    pub stats: SizeStats,
    /// Ordered by task id.
    pub entries: Vec<TaskReport>,
}

impl BatchReport {
    pub fn summarize(mut entries: Vec<TaskReport>, aborted: bool, interrupted: bool) -> Self {
        entries.sort_by_key(|e| e.task_id);

        let mut succeeded = 0;
        let mut failed = 0;
        let mut not_attempted = 0;
        let mut total_original = FileSize::ZERO;
        let mut total_final = FileSize::ZERO;
        let mut ratios = Vec::new();

        for entry in &entries {
            match &entry.outcome {
                TaskOutcome::Finalized(file) => {
                    succeeded += 1;
                    total_original = total_original.saturating_add(FileSize::new(entry.original_size));
                    total_final = total_final.saturating_add(FileSize::new(file.final_size));
                    if let Some(r) = FileSize::new(file.new_size).compression_ratio(FileSize::new(entry.original_size)) {
                        ratios.push(r);
                    }
                }
                TaskOutcome::Failed { .. } => failed += 1,
                TaskOutcome::NotAttempted => not_attempted += 1,
            }
        }

        let mean_ratio = (!ratios.is_empty()).then(|| ratios.iter().sum::<f64>() / ratios.len() as f64);
        let best_ratio = ratios.iter().copied().reduce(f64::min);
        let worst_ratio = ratios.iter().copied().reduce(f64::max);

        let stats = SizeStats {
            total_original,
            total_final,
            saved: total_original.saturating_sub(total_final),
            overall_ratio: total_final.compression_ratio(total_original),
            mean_ratio,
            best_ratio,
            worst_ratio,
        };

        Self {
            started_at: None,
            elapsed_secs: 0.0,
            total: entries.len(),
            succeeded,
            failed,
            not_attempted,
            aborted,
            interrupted,
            stats,
            entries,
        }
    }

    pub fn from_run(run: FinalizationRun) -> Self {
        Self::summarize(run.reports, run.aborted, run.interrupted)
    }

    pub fn with_timing(mut self, started_at: DateTime<Local>, elapsed: Duration) -> Self {
        self.started_at = Some(started_at);
        self.elapsed_secs = elapsed.as_secs_f64();
        self
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total && !self.aborted
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TaskOutcome::Failed { .. }))
    }

    pub fn not_attempted(&self) -> impl Iterator<Item = &TaskReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, TaskOutcome::NotAttempted))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// `Original | New | Ratio | Keeping | Filename`, then failures.
    pub fn render_table<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let w = COLUMN_WIDTH;
        writeln!(
            out,
            "\n{}",
            style(format!(
                "{:^w$} | {:^w$} | {:^w$} | {:^w$} | Filename",
                "Original", "New", "Ratio", "Keeping"
            ))
            .bold()
        )?;

        for entry in &self.entries {
            match &entry.outcome {
                TaskOutcome::Finalized(file) => {
                    let ratio = FileSize::new(file.new_size)
                        .compression_ratio(FileSize::new(entry.original_size))
                        .map(|r| format!("{:.3}%", r * 100.0))
                        .unwrap_or_else(|| "-".to_string());
                    let keeping = if file.overwrite_refused {
                        format!("{}*", file.kept.as_str())
                    } else {
                        file.kept.as_str().to_string()
                    };
                    let filename = entry.destination.as_deref().unwrap_or(&entry.input);
                    writeln!(
                        out,
                        "{:>w$} | {:>w$} | {:>w$} | {:^w$} | {}",
                        human_readable_size(entry.original_size),
                        human_readable_size(file.new_size),
                        ratio,
                        keeping,
                        filename.display()
                    )?;
                }
                TaskOutcome::Failed { reason } => {
                    writeln!(
                        out,
                        "{:>w$} | {:>w$} | {:>w$} | {:^w$} | {}",
                        human_readable_size(entry.original_size),
                        "-",
                        "-",
                        style(reason.label()).red(),
                        entry.input.display()
                    )?;
                }
                TaskOutcome::NotAttempted => {
                    writeln!(
                        out,
                        "{:>w$} | {:>w$} | {:>w$} | {:^w$} | {}",
                        human_readable_size(entry.original_size),
                        "-",
                        "-",
                        style("pending").dim(),
                        entry.input.display()
                    )?;
                }
            }
        }

        if self
            .entries
            .iter()
            .any(|e| matches!(&e.outcome, TaskOutcome::Finalized(f) if f.overwrite_refused))
        {
            writeln!(
                out,
                "\n* new file was smaller but overwriting originals is not allowed (use --force)"
            )?;
        }

        let mut failures = self.failures().peekable();
        if failures.peek().is_some() {
            writeln!(out, "\n{}", style("❌ Failed files:").red().bold())?;
            for entry in failures {
                if let TaskOutcome::Failed { reason } = &entry.outcome {
                    writeln!(
                        out,
                        "   [{}] {} → {}",
                        reason.label(),
                        entry.input.display(),
                        reason.message()
                    )?;
                }
            }
        }

        if self.aborted {
            let headline = if self.interrupted {
                "⚠️  Interrupted: batch stopped early."
            } else {
                "⚠️  Aborted: batch stopped early."
            };
            writeln!(out, "\n{}", style(headline).yellow().bold())?;
            let mut pending = self.not_attempted().peekable();
            if pending.peek().is_some() {
                writeln!(out, "   Not attempted:")?;
                for entry in pending {
                    writeln!(out, "   - {}", entry.input.display())?;
                }
            }
        }

        Ok(())
    }

    pub fn render_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let stats = &self.stats;
        let percent = |r: Option<f64>| {
            r.map(|r| format!("{:.1}%", r * 100.0))
                .unwrap_or_else(|| "-".to_string())
        };

        writeln!(out)?;
        writeln!(out, "╔══════════════════════════════════════════════════╗")?;
        writeln!(out, "║            📊 PDF Batch Summary Report           ║")?;
        writeln!(out, "╠══════════════════════════════════════════════════╣")?;
        writeln!(out, "║  📁 Files:            {:>12}               ║", self.total)?;
        writeln!(out, "║  ✅ Succeeded:        {:>12}               ║", self.succeeded)?;
        writeln!(out, "║  ❌ Failed:           {:>12}               ║", self.failed)?;
        if self.not_attempted > 0 {
            writeln!(out, "║  ⏸️  Not attempted:    {:>12}               ║", self.not_attempted)?;
        }
        writeln!(out, "╠══════════════════════════════════════════════════╣")?;
        writeln!(out, "║  💾 Original size:    {:>12}               ║", format_bytes(stats.total_original.bytes()))?;
        writeln!(out, "║  💾 Final size:       {:>12}               ║", format_bytes(stats.total_final.bytes()))?;
        writeln!(out, "║  📉 Saved:            {:>12}               ║", format_bytes(stats.saved.bytes()))?;
        writeln!(out, "║  📊 Overall ratio:    {:>12}               ║", percent(stats.overall_ratio))?;
        writeln!(out, "║  📊 Mean ratio:       {:>12}               ║", percent(stats.mean_ratio))?;
        writeln!(out, "║  🏆 Best ratio:       {:>12}               ║", percent(stats.best_ratio))?;
        writeln!(out, "║  🐢 Worst ratio:      {:>12}               ║", percent(stats.worst_ratio))?;
        writeln!(out, "╠══════════════════════════════════════════════════╣")?;
        writeln!(
            out,
            "║  ⏱️  Total time:       {:>12}               ║",
            format_duration(Duration::from_secs_f64(self.elapsed_secs.max(0.0)))
        )?;
        writeln!(out, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }

    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.render_table(&mut out)?;
        self.render_summary(&mut out)
    }
}
