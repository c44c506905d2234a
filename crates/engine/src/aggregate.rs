//! Result aggregation
//!
//! The aggregator is the only state written by more than one worker. Updates
//! are commutative sums and counts behind a mutex, so completion order does
//! not matter.

use crate::report::{savings_ratio, FailureRecord, RunReport};
use crate::task::{TaskStatus, VideoTask};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Error type for aggregation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// Only terminal tasks can be recorded
    #[error("task {} is {status}, not terminal", .path.display())]
    NotTerminal { path: PathBuf, status: TaskStatus },

    /// `record` was called after `finalize`
    #[error("aggregator already finalized")]
    Finalized,
}

#[derive(Debug, Default)]
struct Totals {
    total_tasks: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    cancelled_tasks: usize,
    total_original_bytes: u64,
    total_compressed_bytes: u64,
    failures: Vec<FailureRecord>,
    report: Option<RunReport>,
}

/// Accumulates terminal task outcomes into a [`RunReport`]
#[derive(Debug, Default)]
pub struct Aggregator {
    totals: Mutex<Totals>,
}

/// Aggregator shared across pool workers
pub type SharedAggregator = Arc<Aggregator>;

/// Creates a new SharedAggregator with empty totals
pub fn new_shared_aggregator() -> SharedAggregator {
    Arc::new(Aggregator::default())
}

impl Aggregator {
    /// Record one terminal task. Call exactly once per task.
    pub async fn record(&self, task: &VideoTask) -> Result<(), AggregateError> {
        let mut totals = self.totals.lock().await;
        if totals.report.is_some() {
            return Err(AggregateError::Finalized);
        }

        match task.status() {
            TaskStatus::Succeeded => {
                totals.succeeded += 1;
                totals.total_original_bytes = totals
                    .total_original_bytes
                    .saturating_add(task.original_size_bytes().unwrap_or(0));
                totals.total_compressed_bytes = totals
                    .total_compressed_bytes
                    .saturating_add(task.compressed_size_bytes().unwrap_or(0));
            }
            TaskStatus::Failed => {
                totals.failed += 1;
                let cancelled = task.is_cancelled();
                if cancelled {
                    totals.cancelled_tasks += 1;
                }
                totals.failures.push(FailureRecord {
                    path: task.input_path().to_path_buf(),
                    detail: task.error_detail().unwrap_or_default(),
                    cancelled,
                });
            }
            TaskStatus::Skipped => totals.skipped += 1,
            status => {
                return Err(AggregateError::NotTerminal {
                    path: task.input_path().to_path_buf(),
                    status,
                })
            }
        }
        totals.total_tasks += 1;
        Ok(())
    }

    /// Produce the report over everything recorded so far
    ///
    /// The first call freezes the aggregator; later calls return the same
    /// report and `record` is rejected from then on.
    pub async fn finalize(&self, was_cancelled: bool) -> RunReport {
        let mut totals = self.totals.lock().await;
        if let Some(report) = &totals.report {
            return report.clone();
        }

        let mut failures = std::mem::take(&mut totals.failures);
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let report = RunReport {
            total_tasks: totals.total_tasks,
            succeeded: totals.succeeded,
            failed: totals.failed,
            skipped: totals.skipped,
            cancelled_tasks: totals.cancelled_tasks,
            total_original_bytes: totals.total_original_bytes,
            total_compressed_bytes: totals.total_compressed_bytes,
            savings_ratio: savings_ratio(totals.total_original_bytes, totals.total_compressed_bytes),
            failures,
            was_cancelled,
        };
        totals.report = Some(report.clone());
        report
    }
}
