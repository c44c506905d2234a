//! Run report
//!
//! Provides the final summary of a run with JSON serialization support and a
//! human-readable rendering.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One failed task in the report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub detail: String,
    pub cancelled: bool,
}

/// Totals over every task of a run
///
/// Byte totals cover `Succeeded` tasks only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub total_tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Failed tasks whose failure was cancellation
    pub cancelled_tasks: usize,
    pub total_original_bytes: u64,
    pub total_compressed_bytes: u64,
    /// `1 - compressed / original`; `None` when nothing was compressed
    pub savings_ratio: Option<f64>,
    pub failures: Vec<FailureRecord>,
    pub was_cancelled: bool,
}

/// Overall outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failed => 1,
            RunStatus::Cancelled => 130,
        }
    }
}

/// `1 - compressed / original`, undefined for an empty original total
pub fn savings_ratio(total_original_bytes: u64, total_compressed_bytes: u64) -> Option<f64> {
    if total_original_bytes == 0 {
        return None;
    }
    Some(1.0 - total_compressed_bytes as f64 / total_original_bytes as f64)
}

impl RunReport {
    pub fn status(&self) -> RunStatus {
        if self.was_cancelled || self.cancelled_tasks > 0 {
            RunStatus::Cancelled
        } else if self.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Success
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RunStatus::Success
    }

    /// Multi-line summary for the console
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Processed {} files: {} succeeded, {} failed, {} skipped",
            self.total_tasks, self.succeeded, self.failed, self.skipped
        );
        let _ = writeln!(
            out,
            "Original size:   {:.2} GiB",
            self.total_original_bytes as f64 / GIB
        );
        let _ = writeln!(
            out,
            "Compressed size: {:.2} GiB",
            self.total_compressed_bytes as f64 / GIB
        );
        match self.savings_ratio {
            Some(ratio) => {
                let _ = writeln!(out, "Savings:         {:.1}%", ratio * 100.0);
            }
            None => {
                let _ = writeln!(out, "Savings:         N/A");
            }
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failures:");
            for failure in &self.failures {
                let first_line = failure.detail.lines().next().unwrap_or_default();
                let _ = writeln!(out, "  {}: {}", failure.path.display(), first_line);
            }
        }

        if self.status() == RunStatus::Cancelled {
            let _ = writeln!(
                out,
                "Run cancelled: {} tasks did not complete",
                self.cancelled_tasks
            );
        }
        out
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::from)?;
        std::fs::write(path, json)
    }
}
