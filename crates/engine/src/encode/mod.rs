//! Encoding collaborators
//!
//! The scheduler talks to the encoder only through [`Encoder`]; the ffmpeg
//! implementation lives in [`ffmpeg`].

pub mod ffmpeg;

use crate::config::Acceleration;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use ffmpeg::{build_ffmpeg_command, FfmpegEncoder, VideoCodec};

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Encoder process could not be started
    #[error("failed to start encoder {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error while the encoder was running
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Run was cancelled while the encoder was running
    #[error("cancelled")]
    Cancelled,
}

/// Request for hardware-assisted encoding. Not guaranteed to be honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelerationHint {
    /// Use hardware encoding if the encoder offers it
    PreferHardware,
    /// Always encode in software
    Software,
}

impl From<Acceleration> for AccelerationHint {
    fn from(accel: Acceleration) -> Self {
        match accel {
            Acceleration::Auto => AccelerationHint::PreferHardware,
            Acceleration::Software => AccelerationHint::Software,
        }
    }
}

/// Parameters for one encode
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub crf: u8,
    pub acceleration: AccelerationHint,
}

/// What the encoder process reported when it finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutput {
    /// Exit code; `None` if the process was ended by a signal
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl EncodeOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Human-readable exit status, e.g. `exit code 1`
    pub fn status_text(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {}", code),
            None => "termination by signal".to_string(),
        }
    }
}

/// Runs one encode to completion.
///
/// Implementations must return [`EncodeError::Cancelled`] once `cancel`
/// fires during the encode, after asking the process to stop.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
    ) -> Result<EncodeOutput, EncodeError>;
}
