//! H.265 Batch Transcoder
//!
//! Orchestration engine that scans a directory tree for videos, skips the ones
//! already transcoded, picks a CRF per file and runs ffmpeg sequentially or on
//! a bounded pool with cooperative cancellation and an aggregate report.

pub mod aggregate;
pub mod concurrency;
pub mod crf;
pub mod encode;
pub mod job_executor;
pub mod naming;
pub mod orchestrator;
pub mod preflight;
pub mod probe;
pub mod report;
pub mod run_config;
pub mod scan;
pub mod scheduler;
pub mod skip;
pub mod task;

#[cfg(test)]
mod testing;

pub use h265_batch_config as config;
pub use h265_batch_config::Config;
pub use tokio_util::sync::CancellationToken;

pub use aggregate::{new_shared_aggregator, AggregateError, Aggregator, SharedAggregator};
pub use concurrency::{ConcurrencyMode, ConcurrencyPlan};
pub use crf::CrfPolicy;
pub use encode::{
    build_ffmpeg_command, AccelerationHint, EncodeError, EncodeOutput, EncodeRequest, Encoder,
    FfmpegEncoder, VideoCodec,
};
pub use job_executor::JobExecutor;
pub use naming::{
    output_path_for, output_root, partial_path_for, NamingError, OUTPUT_DIR_NAME, OUTPUT_SUFFIX,
};
pub use orchestrator::{Orchestrator, RunError};
pub use preflight::{
    check_tool_available, major_version, parse_tool_version, run_preflight_checks, PreflightError,
};
pub use probe::{FfprobeProber, ProbeError, Prober, Resolution};
pub use report::{FailureRecord, RunReport, RunStatus};
pub use run_config::RunConfiguration;
pub use scan::{scan_videos, ScanError, Scanner, VIDEO_EXTENSIONS};
pub use scheduler::Scheduler;
pub use skip::should_skip;
pub use task::{TaskError, TaskStatus, VideoTask};
