//! Worker pool coordinator (phase 1).
//!
//! A dedicated rayon pool with exactly `jobs` threads runs one conversion per
//! task. Results come back in task order and only after every worker has
//! finished; nothing is handed to finalization early.

use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::task::TaskDescriptor;
use crate::worker::{self, ConversionOutcome, ConversionResult};
use indicatif::ProgressBar;
use rayon::prelude::*;
use shared_utils::CancelToken;
use tracing::{info, warn};

/// Map `f` over `items` with at most `jobs` calls in flight.
pub fn run_bounded<T, R, F>(items: Vec<T>, jobs: usize, f: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Send + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .thread_name(|i| format!("gs-worker-{}", i))
        .build()?;

    Ok(pool.install(|| items.into_par_iter().map(f).collect()))
}

/// Run every task and wait for all of them.
///
/// If `cancel` fires, running tools are killed, unstarted tasks are never
/// launched, every artifact produced so far is dropped (and so deleted) and
/// the whole phase returns `BatchError::Interrupted`.
pub fn run_conversions(
    tasks: Vec<TaskDescriptor>,
    config: &BatchConfig,
    cancel: &CancelToken,
    progress: &ProgressBar,
) -> Result<Vec<ConversionResult>> {
    info!(tasks = tasks.len(), jobs = config.jobs, "Starting conversions");

    let results = run_bounded(tasks, config.jobs, |task| {
        let result = worker::convert(&task, config.deadline, cancel);
        if let Ok(r) = &result {
            let status = match &r.outcome {
                ConversionOutcome::Succeeded { .. } => "✅",
                ConversionOutcome::ToolFailed { .. } => "❌",
                ConversionOutcome::TimedOut { .. } => "⏱️",
            };
            progress.set_message(format!(
                "{} {} ({} pages)",
                status,
                task.file_name().to_string_lossy(),
                r.pages
            ));
            progress.inc(1);
        }
        result
    })?;

    if cancel.is_cancelled() {
        warn!("Conversions interrupted, discarding results");
        return Err(BatchError::Interrupted);
    }

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_concurrency_never_exceeds_pool_size() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let out = run_bounded((0..12).collect(), 3, |i: usize| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            running.fetch_sub(1, Ordering::SeqCst);
            i * 2
        })
        .unwrap();

        assert_eq!(out, (0..12).map(|i| i * 2).collect::<Vec<_>>());
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 3, "peak concurrency {}", peak);
    }

    #[test]
    fn test_single_worker_runs_serially() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        run_bounded((0..5).collect(), 1, |_: usize| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    mod with_stub_tool {
        use super::super::*;
        use crate::task::build_tasks;
        use crate::test_support::{stub_invocation, write_input};
        use std::thread;
        use std::time::{Duration, Instant};
        use tempfile::TempDir;

        fn hidden_bar() -> ProgressBar {
            shared_utils::create_progress_bar(0, "test", false)
        }

        #[test]
        fn test_failures_are_isolated_and_order_is_kept() {
            let dir = TempDir::new().unwrap();
            let inputs = vec![
                write_input(dir.path(), "ok1.pdf", 100),
                write_input(dir.path(), "bad.pdf", 100),
                write_input(dir.path(), "ok2.pdf", 100),
                write_input(dir.path(), "ok3.pdf", 100),
            ];
            let script = r#"case "$1" in *bad.pdf) exit 1;; esac; head -c 50 "$1" > "$2""#;
            let tasks = build_tasks(inputs, stub_invocation(script));
            let config = BatchConfig::default().with_jobs(2);

            let results = run_conversions(tasks, &config, &CancelToken::new(), &hidden_bar()).unwrap();

            assert_eq!(results.len(), 4);
            for (i, r) in results.iter().enumerate() {
                assert_eq!(r.task_id.0, i);
            }
            assert!(results[0].outcome.is_success());
            assert!(matches!(results[1].outcome, ConversionOutcome::ToolFailed { .. }));
            assert!(results[2].outcome.is_success());
            assert!(results[3].outcome.is_success());
        }

        #[test]
        fn test_cancelled_token_launches_nothing() {
            let dir = TempDir::new().unwrap();
            let marker = dir.path().join("ran");
            let inputs = vec![write_input(dir.path(), "a.pdf", 10)];
            let tasks = build_tasks(
                inputs,
                stub_invocation(&format!("touch '{}'", marker.display())),
            );
            let token = CancelToken::new();
            token.cancel();

            let err = run_conversions(tasks, &BatchConfig::default(), &token, &hidden_bar()).unwrap_err();
            assert!(matches!(err, BatchError::Interrupted));
            assert!(!marker.exists());
        }

        #[test]
        fn test_interrupt_kills_running_tools() {
            let dir = TempDir::new().unwrap();
            let inputs: Vec<_> = (0..4)
                .map(|i| write_input(dir.path(), &format!("{}.pdf", i), 10))
                .collect();
            // the shell and a background grandchild both record their pids
            let script = r#"echo $$ > "$1.pid"; sleep 5 & echo $! >> "$1.pid"; wait"#;
            let tasks = build_tasks(inputs.clone(), stub_invocation(script));
            let config = BatchConfig::default().with_jobs(2).with_deadline(None);
            let token = CancelToken::new();
            let remote = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(300));
                remote.cancel();
            });

            let start = Instant::now();
            let err = run_conversions(tasks, &config, &token, &hidden_bar()).unwrap_err();
            assert!(matches!(err, BatchError::Interrupted));
            assert!(start.elapsed() < Duration::from_secs(4));

            let pids: Vec<libc::pid_t> = inputs
                .iter()
                .filter_map(|input| std::fs::read_to_string(format!("{}.pid", input.display())).ok())
                .flat_map(|text| {
                    text.lines()
                        .filter_map(|l| l.trim().parse().ok())
                        .collect::<Vec<_>>()
                })
                .collect();
            assert!(pids.len() >= 2, "no tool recorded its pid: {:?}", pids);
            for pid in pids {
                assert!(process_is_gone(pid), "process {} outlived the interrupt", pid);
            }
        }

        /// Waits briefly for init to reap reparented grandchildren.
        fn process_is_gone(pid: libc::pid_t) -> bool {
            let deadline = Instant::now() + Duration::from_secs(2);
            loop {
                // SAFETY: signal 0 only checks for existence.
                let alive = unsafe { libc::kill(pid, 0) } == 0;
                if !alive {
                    return std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH);
                }
                if Instant::now() >= deadline {
                    return false;
                }
                thread::sleep(Duration::from_millis(20));
            }
        }
    }
}
