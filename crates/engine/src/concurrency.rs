//! Concurrency planning
//!
//! Derives the scheduling mode from configuration and the host's core count.

use crate::config::{ConfigError, RunConfig, RunMode};
use std::num::NonZeroUsize;

/// How the scheduler runs tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyMode {
    /// One task after another, in scan order
    Sequential,
    /// Up to N tasks at once; N is a hard cap on live encoder processes
    Pooled(NonZeroUsize),
}

impl ConcurrencyMode {
    /// Maximum number of tasks running at the same time.
    pub fn max_active(&self) -> usize {
        match self {
            ConcurrencyMode::Sequential => 1,
            ConcurrencyMode::Pooled(n) => n.get(),
        }
    }
}

impl std::fmt::Display for ConcurrencyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConcurrencyMode::Sequential => write!(f, "sequential"),
            ConcurrencyMode::Pooled(n) => write!(f, "pooled ({} workers)", n),
        }
    }
}

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    pub mode: ConcurrencyMode,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan, detecting the core count via num_cpus
    pub fn derive(cfg: &RunConfig) -> Result<Self, ConfigError> {
        Self::derive_with_cores(cfg, num_cpus::get() as u32)
    }

    /// Derive a concurrency plan for a known core count
    ///
    /// Pooled mode needs at least one worker; the worker count is otherwise
    /// honoured as given, even above the core count.
    pub fn derive_with_cores(cfg: &RunConfig, total_cores: u32) -> Result<Self, ConfigError> {
        let mode = match cfg.mode {
            RunMode::Sequential => ConcurrencyMode::Sequential,
            RunMode::Pooled => {
                let workers = NonZeroUsize::new(cfg.workers as usize)
                    .ok_or(ConfigError::InvalidWorkers(cfg.workers))?;
                ConcurrencyMode::Pooled(workers)
            }
        };

        Ok(Self { total_cores, mode })
    }

    /// True when the pool has more workers than the host has logical cores
    pub fn oversubscribed(&self) -> bool {
        self.mode.max_active() > self.total_cores.max(1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn run_config(mode: RunMode, workers: u32) -> RunConfig {
        RunConfig {
            mode,
            workers,
            crf: None,
        }
    }

    #[test]
    fn test_sequential_ignores_worker_count() {
        let plan = ConcurrencyPlan::derive_with_cores(&run_config(RunMode::Sequential, 0), 8).unwrap();
        assert_eq!(plan.mode, ConcurrencyMode::Sequential);
        assert_eq!(plan.mode.max_active(), 1);
        assert!(!plan.oversubscribed());
    }

    #[test]
    fn test_pooled_with_zero_workers_is_rejected() {
        let result = ConcurrencyPlan::derive_with_cores(&run_config(RunMode::Pooled, 0), 8);
        assert!(matches!(result, Err(ConfigError::InvalidWorkers(0))));
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ConcurrencyMode::Sequential.to_string(), "sequential");
        let pooled = ConcurrencyMode::Pooled(NonZeroUsize::new(3).unwrap());
        assert_eq!(pooled.to_string(), "pooled (3 workers)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_pooled_worker_count_preserved(
            cores in 1u32..256,
            workers in 1u32..64,
        ) {
            let plan = ConcurrencyPlan::derive_with_cores(
                &run_config(RunMode::Pooled, workers),
                cores,
            ).unwrap();

            prop_assert_eq!(plan.total_cores, cores);
            prop_assert_eq!(plan.mode.max_active(), workers as usize);
            prop_assert_eq!(plan.oversubscribed(), workers > cores);
        }
    }
}
