//! Thread Manager
//!
//! Sizes the worker pool for batches of external-tool conversions. Each
//! worker supervises one child process that is itself CPU hungry, so the
//! default leaves headroom instead of claiming every core.

use std::sync::OnceLock;

static OPTIMAL_THREADS: OnceLock<usize> = OnceLock::new();

/// Environment variable that halves the default pool when set.
pub const MULTI_INSTANCE_ENV: &str = "GS_BATCH_MULTI_INSTANCE";

#[derive(Debug, Clone)]
pub struct ThreadConfig {
    /// Percentage of cores to use (0-100)
    pub core_percentage: usize,
    pub min_threads: usize,
    pub max_threads: usize,
    /// Halve the share when several instances run side by side
    pub multi_instance_aware: bool,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            core_percentage: 75,
            min_threads: 1,
            max_threads: 16,
            multi_instance_aware: true,
        }
    }
}

pub fn calculate_optimal_threads(config: &ThreadConfig) -> usize {
    calculate_for_cores(num_cpus::get(), config, is_multi_instance())
}

fn calculate_for_cores(cpu_count: usize, config: &ThreadConfig, multi_instance: bool) -> usize {
    let effective_percentage = if config.multi_instance_aware && multi_instance {
        config.core_percentage / 2
    } else {
        config.core_percentage
    };

    let calculated = (cpu_count * effective_percentage / 100).max(1);
    calculated.clamp(config.min_threads.max(1), config.max_threads.max(1))
}

/// Default worker count for conversion batches (cached).
pub fn get_optimal_threads() -> usize {
    *OPTIMAL_THREADS.get_or_init(|| calculate_optimal_threads(&ThreadConfig::default()))
}

pub fn is_multi_instance() -> bool {
    std::env::var_os(MULTI_INSTANCE_ENV).is_some()
}
