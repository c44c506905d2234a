//! Job executor
//!
//! Drives a single task through probe -> CRF resolution -> encode -> size
//! collection. Every failure is folded into the task as a [`TaskError`]; the
//! executor itself never fails, so one bad file cannot abort a run.

use crate::crf::CrfPolicy;
use crate::encode::{AccelerationHint, EncodeError, EncodeRequest, Encoder};
use crate::naming::partial_path_for;
use crate::probe::Prober;
use crate::task::{TaskError, VideoTask};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Runs tasks against a prober and an encoder
#[derive(Clone)]
pub struct JobExecutor {
    prober: Arc<dyn Prober>,
    encoder: Arc<dyn Encoder>,
    policy: CrfPolicy,
    crf_override: Option<u8>,
    acceleration: AccelerationHint,
}

impl JobExecutor {
    pub fn new(
        prober: Arc<dyn Prober>,
        encoder: Arc<dyn Encoder>,
        policy: CrfPolicy,
        crf_override: Option<u8>,
        acceleration: AccelerationHint,
    ) -> Self {
        Self {
            prober,
            encoder,
            policy,
            crf_override,
            acceleration,
        }
    }

    /// Execute a pending task and return it in a terminal state
    ///
    /// The input file is only ever read. ffmpeg writes to a hidden partial
    /// sibling of the output that is renamed into place only after the encode
    /// exits cleanly with a non-empty file, so the skip detector never sees an
    /// unfinished output, even after the process itself dies mid-encode.
    pub async fn execute(&self, mut task: VideoTask, cancel: &CancellationToken) -> VideoTask {
        if let Err(e) = task.mark_running() {
            warn!("Not executing {}: {}", task.input_path().display(), e);
            return task;
        }
        debug!("Running {}", task.input_path().display());

        let result = self.run(&mut task, cancel).await;
        if let Err(err) = result {
            let _ = task.mark_failed(err);
        }
        task
    }

    async fn run(&self, task: &mut VideoTask, cancel: &CancellationToken) -> Result<(), TaskError> {
        let crf = match self.crf_override {
            Some(crf) => self.policy.resolve(0, Some(crf)),
            None => {
                let resolution = tokio::select! {
                    result = self.prober.probe(task.input_path()) => {
                        result.map_err(|e| {
                            if cancel.is_cancelled() {
                                TaskError::Cancelled
                            } else {
                                TaskError::Probe(e.to_string())
                            }
                        })?
                    }
                    _ = cancel.cancelled() => return Err(TaskError::Cancelled),
                };
                task.set_resolution_height(resolution.height);
                self.policy.resolve(resolution.height, None)
            }
        };
        task.set_crf(crf);

        if let Some(parent) = task.output_path().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::Io(format!("creating {}: {}", parent.display(), e)))?;
        }

        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let partial = partial_path_for(task.output_path()).ok_or_else(|| {
            TaskError::Io(format!("{} has no file name", task.output_path().display()))
        })?;
        let request = EncodeRequest {
            input_path: task.input_path().to_path_buf(),
            output_path: partial,
            crf,
            acceleration: self.acceleration,
        };

        // Nothing appears at the output path until the encode has been checked.
        let committed = match self.encode_partial(&request, cancel).await {
            Ok(compressed) => self.commit(task, &request.output_path, compressed).await,
            Err(err) => Err(err),
        };
        if committed.is_err() {
            remove_partial_output(&request.output_path).await;
        }
        committed
    }

    /// Encode into the partial path and return its size once it checks out
    async fn encode_partial(&self, request: &EncodeRequest, cancel: &CancellationToken) -> Result<u64, TaskError> {
        let output = match self.encoder.encode(request, cancel).await {
            Ok(output) => output,
            Err(EncodeError::Cancelled) => return Err(TaskError::Cancelled),
            Err(e) => return Err(TaskError::Encoder(e.to_string())),
        };

        if !output.success() {
            // An interrupt can end the encoder before the token is seen.
            if cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            return Err(TaskError::Encode {
                status: output.status_text(),
                stderr: output.stderr,
            });
        }

        match tokio::fs::metadata(&request.output_path).await {
            Ok(meta) if meta.len() > 0 => Ok(meta.len()),
            Ok(_) => Err(TaskError::MissingOutput(format!(
                "{} is empty",
                request.output_path.display()
            ))),
            Err(e) => Err(TaskError::MissingOutput(format!(
                "{}: {}",
                request.output_path.display(),
                e
            ))),
        }
    }

    /// Move a checked partial output into place and close the task
    async fn commit(&self, task: &mut VideoTask, partial: &Path, compressed: u64) -> Result<(), TaskError> {
        let original = tokio::fs::metadata(task.input_path())
            .await
            .map_err(|e| TaskError::Io(format!("{}: {}", task.input_path().display(), e)))?
            .len();

        tokio::fs::rename(partial, task.output_path())
            .await
            .map_err(|e| TaskError::Io(format!("committing {}: {}", task.output_path().display(), e)))?;

        task.mark_succeeded(original, compressed)
            .map_err(|e| TaskError::Io(e.to_string()))?;
        Ok(())
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}
