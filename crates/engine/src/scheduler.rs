//! Task scheduling
//!
//! Drives pending tasks through the [`JobExecutor`] either one at a time or on
//! a fixed-size pool. Cancellation is observed before each dispatch; tasks
//! that never got dispatched are failed as cancelled and still recorded, so
//! the report accounts for every task.

use crate::aggregate::SharedAggregator;
use crate::concurrency::ConcurrencyMode;
use crate::job_executor::JobExecutor;
use crate::task::{TaskError, VideoTask};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Runs tasks and hands every terminal task to the aggregator
pub struct Scheduler {
    executor: Arc<JobExecutor>,
    aggregator: SharedAggregator,
    mode: ConcurrencyMode,
}

impl Scheduler {
    pub fn new(executor: JobExecutor, aggregator: SharedAggregator, mode: ConcurrencyMode) -> Self {
        Self {
            executor: Arc::new(executor),
            aggregator,
            mode,
        }
    }

    /// Run `tasks` in order and return them, all terminal
    ///
    /// Tasks come back in dispatch order, which is the input order.
    pub async fn run(&self, tasks: Vec<VideoTask>, cancel: &CancellationToken) -> Vec<VideoTask> {
        info!("Scheduling {} tasks ({})", tasks.len(), self.mode);
        match self.mode {
            ConcurrencyMode::Sequential => self.run_sequential(tasks, cancel).await,
            ConcurrencyMode::Pooled(workers) => self.run_pooled(tasks, workers.get(), cancel).await,
        }
    }

    async fn run_sequential(&self, tasks: Vec<VideoTask>, cancel: &CancellationToken) -> Vec<VideoTask> {
        let mut done = Vec::with_capacity(tasks.len());
        for task in tasks {
            let task = if cancel.is_cancelled() {
                cancel_pending(task)
            } else {
                self.executor.execute(task, cancel).await
            };
            record(&self.aggregator, &task).await;
            done.push(task);
        }
        done
    }

    async fn run_pooled(&self, tasks: Vec<VideoTask>, workers: usize, cancel: &CancellationToken) -> Vec<VideoTask> {
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles: Vec<(PathBuf, PathBuf, JoinHandle<VideoTask>)> = Vec::with_capacity(tasks.len());
        let mut cancelled: Vec<VideoTask> = Vec::new();
        let mut queue = tasks.into_iter();

        while let Some(task) = queue.next() {
            // A slot must be free before the next encoder may start.
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                for task in std::iter::once(task).chain(queue.by_ref()) {
                    let task = cancel_pending(task);
                    record(&self.aggregator, &task).await;
                    cancelled.push(task);
                }
                break;
            };

            debug!("Dispatching {}", task.input_path().display());
            let input = task.input_path().to_path_buf();
            let output = task.output_path().to_path_buf();
            let executor = self.executor.clone();
            let aggregator = self.aggregator.clone();
            let cancel = cancel.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let task = executor.execute(task, &cancel).await;
                record(&aggregator, &task).await;
                task
            });
            handles.push((input, output, handle));
        }

        let mut done = Vec::with_capacity(handles.len() + cancelled.len());
        for (input, output, handle) in handles {
            match handle.await {
                Ok(task) => done.push(task),
                Err(join_err) => {
                    error!("Worker for {} panicked: {}", input.display(), join_err);
                    let mut task = VideoTask::new(input, output);
                    let _ = task.mark_failed(TaskError::Panicked(join_err.to_string()));
                    record(&self.aggregator, &task).await;
                    done.push(task);
                }
            }
        }
        done.extend(cancelled);
        done
    }
}

fn cancel_pending(mut task: VideoTask) -> VideoTask {
    warn!("Cancelled before start: {}", task.input_path().display());
    let _ = task.mark_failed(TaskError::Cancelled);
    task
}

async fn record(aggregator: &SharedAggregator, task: &VideoTask) {
    match task.error_detail() {
        None => info!(
            "{} {} (crf {:?})",
            task.status(),
            task.input_path().display(),
            task.crf()
        ),
        Some(detail) => warn!("{} {}: {}", task.status(), task.input_path().display(), detail),
    }
    if let Err(e) = aggregator.record(task).await {
        error!("Failed to record {}: {}", task.input_path().display(), e);
    }
}
