//! Resolution probing via ffprobe.
//!
//! The prober is an external collaborator: the scheduler only sees the
//! [`Prober`] trait, and a probe failure fails the single task it belongs to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be started.
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// ffprobe exited with a non-zero status.
    #[error("ffprobe failed: {0}")]
    Failed(String),

    /// ffprobe output was not the expected JSON.
    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    /// The file has no video stream with dimensions.
    #[error("no video stream found")]
    NoVideoStream,
}

/// Pixel dimensions of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Reads the resolution of a video file.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<Resolution, ProbeError>;
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub width: Option<u32>,
        pub height: Option<u32>,
    }
}

/// [`Prober`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: PathBuf,
}

impl FfprobeProber {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `ffprobe -v error -select_streams v:0 -show_entries stream=width,height -of json <path>`
    pub fn build_command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    async fn probe(&self, path: &Path) -> Result<Resolution, ProbeError> {
        let output = self
            .build_command(path)
            .output()
            .await
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::Failed(format!(
                "exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_ffprobe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses ffprobe JSON output into the first video stream's resolution.
pub fn parse_ffprobe_output(json_str: &str) -> Result<Resolution, ProbeError> {
    let parsed: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    parsed
        .streams
        .unwrap_or_default()
        .into_iter()
        .find_map(|stream| match (stream.width, stream.height) {
            (Some(width), Some(height)) => Some(Resolution { width, height }),
            _ => None,
        })
        .ok_or(ProbeError::NoVideoStream)
}
