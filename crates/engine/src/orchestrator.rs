//! Batch orchestrator
//!
//! One run: scan the root, turn candidates into tasks, skip the ones whose
//! output already exists, schedule the rest and finalize the report.

use crate::aggregate::{new_shared_aggregator, SharedAggregator};
use crate::config::ConfigError;
use crate::encode::Encoder;
use crate::job_executor::JobExecutor;
use crate::naming::NamingError;
use crate::probe::Prober;
use crate::report::RunReport;
use crate::run_config::RunConfiguration;
use crate::scan::{ScanError, Scanner};
use crate::scheduler::Scheduler;
use crate::skip::should_skip;
use crate::task::VideoTask;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Errors that abort a run before any task is executed
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("naming error: {0}")]
    Naming(#[from] NamingError),
}

/// Runs one batch over a root directory
pub struct Orchestrator {
    config: RunConfiguration,
    prober: Arc<dyn Prober>,
    encoder: Arc<dyn Encoder>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: RunConfiguration,
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn Encoder>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            prober,
            encoder,
            cancel,
        }
    }

    /// Build pending tasks for every candidate under the root, in scan order
    pub fn discover(&self) -> Result<Vec<VideoTask>, RunError> {
        let root = self.config.root_directory();
        let inputs = Scanner::new(self.config.extensions()).scan(root)?;
        info!("Found {} video files under {}", inputs.len(), root.display());

        inputs
            .iter()
            .map(|input| VideoTask::for_input(root, input).map_err(RunError::from))
            .collect()
    }

    /// Run the batch and return the report
    ///
    /// Fails only on scan errors; every per-file problem ends up in the report.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let tasks = self.discover()?;
        let aggregator = new_shared_aggregator();

        let mut pending = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if should_skip(task.input_path(), task.output_path()) {
                if task.mark_skipped().is_ok() {
                    info!(
                        "Skipping {}: {} exists",
                        task.input_path().display(),
                        task.output_path().display()
                    );
                    record_skip(&aggregator, &task).await;
                }
            } else {
                pending.push(task);
            }
        }

        let executor = JobExecutor::new(
            self.prober.clone(),
            self.encoder.clone(),
            self.config.crf_policy().clone(),
            self.config.crf_override(),
            self.config.acceleration(),
        );
        let scheduler = Scheduler::new(executor, aggregator.clone(), self.config.concurrency_mode());
        scheduler.run(pending, &self.cancel).await;

        Ok(aggregator.finalize(self.cancel.is_cancelled()).await)
    }
}

async fn record_skip(aggregator: &SharedAggregator, task: &VideoTask) {
    if let Err(e) = aggregator.record(task).await {
        error!("Failed to record {}: {}", task.input_path().display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RunMode};
    use crate::report::RunStatus;
    use crate::testing::{write_tree, FakeBehavior, FakeEncoder, FakeProber};
    use std::path::Path;
    use tempfile::TempDir;

    fn run_config(root: &Path, pool: Option<u32>, crf: Option<u8>) -> RunConfiguration {
        let mut config = Config::default();
        if let Some(workers) = pool {
            config.run.mode = RunMode::Pooled;
            config.run.workers = workers;
        }
        config.run.crf = crf;
        RunConfiguration::from_config(root, &config).unwrap()
    }

    fn orchestrator(config: RunConfiguration, prober: FakeProber, encoder: Arc<FakeEncoder>) -> Orchestrator {
        Orchestrator::new(config, Arc::new(prober), encoder, CancellationToken::new())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_files_pooled_then_rerun_skips() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_tree(root, &[("a.mp4", 2000), ("b.mp4", 1000)]);
        let prober = || FakeProber::new().with_height("a.mp4", 1080).with_height("b.mp4", 480);

        let encoder = Arc::new(FakeEncoder::new().with_delay(std::time::Duration::from_millis(50)));
        let report = orchestrator(run_config(root, Some(2), None), prober(), encoder.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(encoder.max_active(), 2);
        let calls = encoder.calls();
        let crf_of = |name: &str| {
            calls
                .iter()
                .find(|(path, _)| path.file_name().unwrap() == name)
                .map(|(_, crf)| *crf)
                .unwrap()
        };
        assert!(crf_of("a.mp4") < crf_of("b.mp4"));
        assert_eq!((report.succeeded, report.failed, report.skipped), (2, 0, 0));
        assert_eq!(report.total_original_bytes, 3000);
        assert_eq!(report.status(), RunStatus::Success);
        assert!(root.join("output_wm/a_h265.mp4").is_file());
        assert!(root.join("output_wm/b_h265.mp4").is_file());

        let encoder = Arc::new(FakeEncoder::new());
        let rerun = orchestrator(run_config(root, Some(2), None), prober(), encoder.clone())
            .run()
            .await
            .unwrap();
        assert_eq!((rerun.succeeded, rerun.failed, rerun.skipped), (0, 0, 2));
        assert_eq!(rerun.total_original_bytes, 0);
        assert_eq!(rerun.savings_ratio, None);
        assert!(encoder.calls().is_empty());
        assert_eq!(rerun.status(), RunStatus::Success);
    }

    #[tokio::test]
    async fn test_failed_encode_continues_and_fails_run() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_tree(root, &[("a.mp4", 10), ("c.mp4", 10), ("d.mp4", 10)]);
        let encoder = Arc::new(
            FakeEncoder::new().with_behavior("c.mp4", FakeBehavior::fail(1, "c.mp4: Invalid data found")),
        );

        let report = orchestrator(run_config(root, None, None), FakeProber::new(), encoder.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(encoder.calls().len(), 3);
        assert_eq!((report.succeeded, report.failed, report.skipped), (2, 1, 0));
        assert_eq!(report.failures[0].path, root.join("c.mp4"));
        assert!(report.failures[0].detail.contains("c.mp4: Invalid data found"));
        assert_eq!(report.status(), RunStatus::Failed);
        assert_eq!(report.status().exit_code(), 1);
    }

    #[tokio::test]
    async fn test_cancel_with_three_pending() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let files: Vec<String> = (0..10).map(|i| format!("v{}.mp4", i)).collect();
        let tree: Vec<(&str, u64)> = files.iter().map(|f| (f.as_str(), 100)).collect();
        write_tree(root, &tree);

        let cancel = CancellationToken::new();
        let encoder = Arc::new(FakeEncoder::new().with_cancel_after(7, cancel.clone()));
        let report = Orchestrator::new(
            run_config(root, None, None),
            Arc::new(FakeProber::new()),
            encoder,
            cancel,
        )
        .run()
        .await
        .unwrap();

        assert_eq!(report.total_tasks, 10);
        assert_eq!(report.succeeded, 7);
        assert_eq!(report.failed, 3);
        assert_eq!(report.cancelled_tasks, 3);
        assert!(report.failures.iter().all(|f| f.detail == "cancelled"));
        assert_eq!(report.total_original_bytes, 700);
        assert!(report.was_cancelled);
        assert_eq!(report.status(), RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_override_is_constant_and_skips_probe() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_tree(root, &[("a.mp4", 10), ("sub/b.mkv", 10)]);
        let encoder = Arc::new(FakeEncoder::new());

        let report = orchestrator(run_config(root, None, Some(21)), FakeProber::failing(), encoder.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert!(encoder.calls().iter().all(|(_, crf)| *crf == 21));
        assert!(root.join("output_wm/sub/b_h265.mkv").is_file());
    }

    #[tokio::test]
    async fn test_partial_tree_mixes_skip_and_success() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_tree(
            root,
            &[("a.mp4", 10), ("b.mp4", 10), ("notes.txt", 5), ("output_wm/a_h265.mp4", 3)],
        );
        let encoder = Arc::new(FakeEncoder::new());

        let report = orchestrator(run_config(root, None, None), FakeProber::new(), encoder.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(report.total_tasks, 2);
        assert_eq!((report.succeeded, report.failed, report.skipped), (1, 0, 1));
        assert_eq!(report.succeeded + report.failed + report.skipped, report.total_tasks);
        // The existing output is left alone.
        assert_eq!(std::fs::metadata(root.join("output_wm/a_h265.mp4")).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_after_abandoned_run_encodes_again() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_tree(root, &[("a.mp4", 100)]);

        let hanging = Arc::new(FakeEncoder::new().with_default_behavior(FakeBehavior::UntilCancelled));
        let aborted = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            orchestrator(run_config(root, None, None), FakeProber::new(), hanging).run(),
        )
        .await;
        assert!(aborted.is_err());
        assert!(!root.join("output_wm/a_h265.mp4").exists());

        let encoder = Arc::new(FakeEncoder::new());
        let rerun = orchestrator(run_config(root, None, None), FakeProber::new(), encoder.clone())
            .run()
            .await
            .unwrap();
        assert_eq!((rerun.succeeded, rerun.skipped), (1, 0));
        assert_eq!(encoder.calls().len(), 1);
        assert!(root.join("output_wm/a_h265.mp4").is_file());
        assert!(!root.join("output_wm/.a_h265.partial.mp4").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = run_config(&dir.path().join("missing"), None, None);
        let result = orchestrator(config, FakeProber::new(), Arc::new(FakeEncoder::new()))
            .run()
            .await;
        assert!(matches!(result, Err(RunError::Scan(ScanError::NotFound(_)))));
    }
}
