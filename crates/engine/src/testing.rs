//! In-process stand-ins for ffprobe and ffmpeg

use crate::encode::{EncodeError, EncodeOutput, EncodeRequest, Encoder};
use crate::probe::{ProbeError, Prober, Resolution};
use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Create `files` (relative path, size in bytes) under `root`
pub fn write_tree(root: &Path, files: &[(&str, u64)]) {
    for (rel, size) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, vec![0u8; *size as usize]).unwrap();
    }
}

/// Prober answering from a height table keyed by file name (1080 if unknown)
#[derive(Debug, Default)]
pub struct FakeProber {
    heights: HashMap<OsString, u32>,
    fail: bool,
}

impl FakeProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_height(mut self, file_name: &str, height: u32) -> Self {
        self.heights.insert(file_name.into(), height);
        self
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, path: &Path) -> Result<Resolution, ProbeError> {
        if self.fail {
            return Err(ProbeError::NoVideoStream);
        }
        let height = path
            .file_name()
            .and_then(|name| self.heights.get(name))
            .copied()
            .unwrap_or(1080);
        Ok(Resolution {
            width: height * 16 / 9,
            height,
        })
    }
}

/// What the fake encoder does for a file
#[derive(Debug, Clone, PartialEq)]
pub enum FakeBehavior {
    /// Exit 0 after writing `bytes` to the output
    Succeed { bytes: u64 },
    /// Leave a partial output, then exit with `code`
    Fail { code: i32, stderr: String },
    /// Exit 0 without writing anything
    NoOutput,
    /// Leave a partial output and run until cancelled
    UntilCancelled,
    /// Leave a partial output and die from an interrupt that also cancels the run
    Interrupted,
}

impl FakeBehavior {
    pub fn fail(code: i32, stderr: &str) -> Self {
        FakeBehavior::Fail {
            code,
            stderr: stderr.to_string(),
        }
    }
}

/// Encoder that records its calls and peak concurrency
#[derive(Debug)]
pub struct FakeEncoder {
    behaviors: HashMap<OsString, FakeBehavior>,
    default_behavior: FakeBehavior,
    delay: Duration,
    cancel_after: Option<(usize, CancellationToken)>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    finished: AtomicUsize,
    calls: Mutex<Vec<(PathBuf, u8)>>,
}

impl Default for FakeEncoder {
    fn default() -> Self {
        Self {
            behaviors: HashMap::new(),
            default_behavior: FakeBehavior::Succeed {
                bytes: Self::DEFAULT_OUTPUT_BYTES,
            },
            delay: Duration::ZERO,
            cancel_after: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeEncoder {
    pub const DEFAULT_OUTPUT_BYTES: u64 = 40;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(mut self, file_name: &str, behavior: FakeBehavior) -> Self {
        self.behaviors.insert(file_name.into(), behavior);
        self
    }

    pub fn with_default_behavior(mut self, behavior: FakeBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Hold every encode for `delay` (cancellable)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `token` once `n` encodes have finished
    pub fn with_cancel_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((n, token));
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, u8)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn run(&self, request: &EncodeRequest, cancel: &CancellationToken) -> Result<EncodeOutput, EncodeError> {
        let behavior = request
            .input_path
            .file_name()
            .and_then(|name| self.behaviors.get(name))
            .unwrap_or(&self.default_behavior)
            .clone();

        if !self.delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => return Err(EncodeError::Cancelled),
            }
        }

        let ok = EncodeOutput {
            exit_code: Some(0),
            stderr: String::new(),
        };
        match behavior {
            FakeBehavior::Succeed { bytes } => {
                tokio::fs::write(&request.output_path, vec![1u8; bytes as usize]).await?;
                Ok(ok)
            }
            FakeBehavior::Fail { code, stderr } => {
                tokio::fs::write(&request.output_path, b"partial").await?;
                Ok(EncodeOutput {
                    exit_code: Some(code),
                    stderr,
                })
            }
            FakeBehavior::NoOutput => Ok(ok),
            FakeBehavior::Interrupted => {
                tokio::fs::write(&request.output_path, b"partial").await?;
                cancel.cancel();
                Ok(EncodeOutput {
                    exit_code: None,
                    stderr: "Exiting normally, received signal 2.".to_string(),
                })
            }
            FakeBehavior::UntilCancelled => {
                tokio::fs::write(&request.output_path, b"partial").await?;
                cancel.cancelled().await;
                Err(EncodeError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn encode(&self, request: &EncodeRequest, cancel: &CancellationToken) -> Result<EncodeOutput, EncodeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push((request.input_path.clone(), request.crf));

        let result = self.run(request, cancel).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let finished = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = &self.cancel_after {
            if finished >= *n {
                token.cancel();
            }
        }
        result
    }
}
