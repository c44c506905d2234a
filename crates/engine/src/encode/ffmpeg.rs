//! ffmpeg encoder
//!
//! Builds and runs `ffmpeg` H.265 encodes. The hardware hint is resolved here,
//! once per encoder instance, by looking for `hevc_nvenc` in the encoder list;
//! callers never see which codec was picked. A listed `hevc_nvenc` can still be
//! unusable (no device), so a failed hardware encode is retried with `libx265`
//! and, once software succeeds where hardware did not, hardware is dropped for
//! the rest of the run.

use super::{AccelerationHint, EncodeError, EncodeOutput, EncodeRequest, Encoder};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time a cancelled encoder gets to finish after being sent `q`
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// H.265 encoder implementation inside ffmpeg
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Software x265
    Libx265,
    /// NVIDIA NVENC
    HevcNvenc,
}

impl VideoCodec {
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Libx265 => "libx265",
            VideoCodec::HevcNvenc => "hevc_nvenc",
        }
    }

    fn quality_args(&self, crf: u8) -> [String; 4] {
        match self {
            VideoCodec::Libx265 => [
                "-crf".to_string(),
                crf.to_string(),
                "-preset".to_string(),
                "slow".to_string(),
            ],
            VideoCodec::HevcNvenc => [
                "-cq".to_string(),
                crf.to_string(),
                "-preset".to_string(),
                "p6".to_string(),
            ],
        }
    }
}

/// Build an ffmpeg command for one encode
///
/// Audio is copied untouched and video is written as 8-bit 4:2:0. Output is
/// overwritten (`-y`): the skip detector has already decided that any file at
/// the output path is not a finished encode.
pub fn build_ffmpeg_command(program: &Path, request: &EncodeRequest, codec: VideoCodec) -> Command {
    let mut cmd = Command::new(program);

    cmd.args(["-hide_banner", "-nostats", "-loglevel", "error", "-y"]);
    cmd.arg("-i").arg(&request.input_path);

    cmd.arg("-c:v").arg(codec.name());
    cmd.args(codec.quality_args(request.crf));

    cmd.args(["-pix_fmt", "yuv420p"]);
    cmd.args(["-c:a", "copy"]);

    cmd.arg(&request.output_path);

    cmd
}

/// True if an `ffmpeg -encoders` listing contains the named encoder
pub fn encoder_listed(listing: &str, encoder: &str) -> bool {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|name| name == encoder)
}

/// [`Encoder`] backed by the `ffmpeg` executable
#[derive(Debug)]
pub struct FfmpegEncoder {
    program: PathBuf,
    nvenc_available: OnceCell<bool>,
    nvenc_unusable: AtomicBool,
    grace_period: Duration,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            nvenc_available: OnceCell::new(),
            nvenc_unusable: AtomicBool::new(false),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Pick the codec for a hint, probing ffmpeg's encoder list on first use
    pub async fn select_codec(&self, hint: AccelerationHint) -> VideoCodec {
        match hint {
            AccelerationHint::Software => VideoCodec::Libx265,
            AccelerationHint::PreferHardware if self.nvenc_unusable.load(Ordering::SeqCst) => {
                VideoCodec::Libx265
            }
            AccelerationHint::PreferHardware => {
                let available = *self
                    .nvenc_available
                    .get_or_init(|| detect_nvenc(&self.program))
                    .await;
                if available {
                    VideoCodec::HevcNvenc
                } else {
                    VideoCodec::Libx265
                }
            }
        }
    }

    /// Ask ffmpeg to quit, then kill it if it outlives the grace period
    async fn stop(&self, child: &mut Child, stdin: Option<ChildStdin>) {
        if let Some(mut stdin) = stdin {
            if stdin.write_all(b"q\n").await.is_ok() {
                let _ = stdin.flush().await;
            }
        }

        match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(_) => debug!("Encoder stopped after quit request"),
            Err(_) => {
                warn!(
                    "Encoder did not stop within {:?}, killing it",
                    self.grace_period
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
            }
        }
    }
}

async fn detect_nvenc(program: &Path) -> bool {
    let output = Command::new(program)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    let available = match output {
        Ok(output) if output.status.success() => {
            encoder_listed(&String::from_utf8_lossy(&output.stdout), "hevc_nvenc")
        }
        Ok(output) => {
            debug!("Encoder listing exited with {}", output.status);
            false
        }
        Err(e) => {
            debug!("Encoder listing failed: {}", e);
            false
        }
    };

    if available {
        info!("Hardware encoder hevc_nvenc available");
    } else {
        info!("Hardware encoder unavailable, using libx265");
    }
    available
}

impl FfmpegEncoder {
    /// Run one ffmpeg process with `codec` to completion or cancellation
    async fn run_codec(
        &self,
        request: &EncodeRequest,
        codec: VideoCodec,
        cancel: &CancellationToken,
    ) -> Result<EncodeOutput, EncodeError> {
        let mut cmd = build_ffmpeg_command(&self.program, request, codec);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal interrupts away from ffmpeg; it is stopped through `stop`.
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            "Starting {} for {} at CRF {}",
            codec.name(),
            request.input_path.display(),
            request.crf
        );

        let mut child = cmd.spawn().map_err(|source| EncodeError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Held open for the quit request; ffmpeg reads commands from stdin.
        let stdin = child.stdin.take();
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                self.stop(&mut child, stdin).await;
                return Err(EncodeError::Cancelled);
            }
        };

        let stderr = match stderr_reader {
            Some(reader) => reader
                .await
                .map(|buf| String::from_utf8_lossy(&buf).into_owned())
                .unwrap_or_default(),
            None => String::new(),
        };

        Ok(EncodeOutput {
            exit_code: status.code(),
            stderr,
        })
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        request: &EncodeRequest,
        cancel: &CancellationToken,
    ) -> Result<EncodeOutput, EncodeError> {
        let codec = self.select_codec(request.acceleration).await;
        let output = self.run_codec(request, codec, cancel).await?;
        if codec != VideoCodec::HevcNvenc || output.success() || cancel.is_cancelled() {
            return Ok(output);
        }

        warn!(
            "hevc_nvenc failed on {} ({}), retrying with libx265",
            request.input_path.display(),
            output.status_text()
        );
        if let Err(e) = tokio::fs::remove_file(&request.output_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", request.output_path.display(), e);
            }
        }

        let retry = self.run_codec(request, VideoCodec::Libx265, cancel).await?;
        if retry.success() && !self.nvenc_unusable.swap(true, Ordering::SeqCst) {
            warn!("hevc_nvenc is listed but not usable, encoding with libx265 from now on");
        }
        Ok(retry)
    }
}
