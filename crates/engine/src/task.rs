//! Video tasks and their lifecycle
//!
//! A task moves `Pending -> (Skipped | Running) -> (Succeeded | Failed)`.
//! Terminal states are final; transition methods refuse anything else and
//! leave the task untouched.

use crate::naming::{output_path_for, NamingError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task failed. The `Display` text is the task's error detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("probe failed: {0}")]
    Probe(String),

    /// Encoder exited unsuccessfully; `stderr` is kept verbatim
    #[error("encoder failed with {status}: {stderr}")]
    Encode { status: String, stderr: String },

    /// Encoder could not be run at all
    #[error("encoder error: {0}")]
    Encoder(String),

    /// Encoder reported success but left no usable output
    #[error("missing output: {0}")]
    MissingOutput(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("cancelled")]
    Cancelled,

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

/// Error returned by an invalid status transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// One input -> output transcode unit
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTask {
    input_path: PathBuf,
    output_path: PathBuf,
    resolution_height: Option<u32>,
    crf: Option<u8>,
    status: TaskStatus,
    original_size_bytes: Option<u64>,
    compressed_size_bytes: Option<u64>,
    error: Option<TaskError>,
}

impl VideoTask {
    /// Create a pending task. The output path must differ from the input path.
    pub fn new(input_path: PathBuf, output_path: PathBuf) -> Self {
        debug_assert_ne!(input_path, output_path);
        Self {
            input_path,
            output_path,
            resolution_height: None,
            crf: None,
            status: TaskStatus::Pending,
            original_size_bytes: None,
            compressed_size_bytes: None,
            error: None,
        }
    }

    /// Create a pending task for `input`, deriving its output path under `root`
    pub fn for_input(root: &Path, input: &Path) -> Result<Self, NamingError> {
        let output = output_path_for(root, input)?;
        Ok(Self::new(input.to_path_buf(), output))
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn resolution_height(&self) -> Option<u32> {
        self.resolution_height
    }

    pub fn crf(&self) -> Option<u8> {
        self.crf
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Populated only on `Succeeded`
    pub fn original_size_bytes(&self) -> Option<u64> {
        self.original_size_bytes
    }

    /// Populated only on `Succeeded`
    pub fn compressed_size_bytes(&self) -> Option<u64> {
        self.compressed_size_bytes
    }

    /// Populated only on `Failed`
    pub fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(TaskError::is_cancelled)
    }

    pub fn set_resolution_height(&mut self, height: u32) {
        self.resolution_height = Some(height);
    }

    pub fn set_crf(&mut self, crf: u8) {
        self.crf = Some(crf);
    }

    fn transition(&mut self, allowed_from: &[TaskStatus], to: TaskStatus) -> Result<(), TransitionError> {
        if !allowed_from.contains(&self.status) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `Pending -> Skipped`; the task will never be executed
    pub fn mark_skipped(&mut self) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Pending], TaskStatus::Skipped)
    }

    /// `Pending -> Running`
    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Pending], TaskStatus::Running)
    }

    /// `Running -> Succeeded` with both file sizes
    pub fn mark_succeeded(&mut self, original_size_bytes: u64, compressed_size_bytes: u64) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Running], TaskStatus::Succeeded)?;
        self.original_size_bytes = Some(original_size_bytes);
        self.compressed_size_bytes = Some(compressed_size_bytes);
        Ok(())
    }

    /// `Running -> Failed`, or `Pending -> Failed` for tasks cancelled before dispatch
    pub fn mark_failed(&mut self, error: TaskError) -> Result<(), TransitionError> {
        self.transition(&[TaskStatus::Pending, TaskStatus::Running], TaskStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }
}
