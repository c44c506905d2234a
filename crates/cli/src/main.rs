//! CLI entry point for the H.265 batch transcoder
//!
//! Parses command line arguments, loads configuration and runs one batch.
//! Exit codes: 0 success, 1 a file failed, 130 cancelled, 2 the run could not start.

use clap::Parser;
use h265_batch::config::{Acceleration, ConfigError, RunMode};
use h265_batch::{
    run_preflight_checks, CancellationToken, Config, FfmpegEncoder, FfprobeProber, Orchestrator,
    RunConfiguration,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const EXIT_SETUP_ERROR: u8 = 2;

/// Batch-transcode a directory tree of videos to H.265
#[derive(Parser, Debug)]
#[command(name = "h265-batch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory to scan for videos
    root: PathBuf,

    /// Path to a configuration file (config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a pool of N concurrent encodes
    #[arg(short, long, value_name = "N", conflicts_with = "sequential")]
    jobs: Option<u32>,

    /// Run a pool with the configured worker count
    #[arg(long, conflicts_with = "sequential")]
    parallel: bool,

    /// Encode one file at a time
    #[arg(long)]
    sequential: bool,

    /// Fixed CRF for every file (18-28)
    #[arg(long)]
    crf: Option<u8>,

    /// Never use hardware encoding
    #[arg(long)]
    software: bool,

    /// Also write the report as JSON to this file
    #[arg(long, value_name = "FILE")]
    report_json: Option<PathBuf>,

    /// Skip the ffmpeg/ffprobe availability checks
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags win over file and environment settings
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(jobs) = self.jobs {
            config.run.mode = RunMode::Pooled;
            config.run.workers = jobs;
        }
        if self.parallel {
            config.run.mode = RunMode::Pooled;
        }
        if self.sequential {
            config.run.mode = RunMode::Sequential;
        }
        if self.crf.is_some() {
            config.run.crf = self.crf;
        }
        if self.software {
            config.encoder.acceleration = Acceleration::Software;
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            "h265_batch=debug"
        } else {
            "h265_batch=info"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Layer file, environment and flags, then freeze the run settings
fn load_configuration(args: &Args) -> Result<(Config, RunConfiguration), ConfigError> {
    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    let run = RunConfiguration::from_config(&args.root, &config)?;
    tracing::debug!(
        "Configuration: {} over {}, ffmpeg {}, ffprobe {}",
        run.concurrency_mode(),
        run.root_directory().display(),
        config.encoder.ffmpeg.display(),
        config.encoder.ffprobe.display()
    );
    Ok((config, run))
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let (config, run_config) = match load_configuration(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    if args.skip_checks {
        tracing::warn!("Skipping preflight checks (--skip-checks enabled)");
    } else if let Err(e) = run_preflight_checks(&config.encoder.ffmpeg, &config.encoder.ffprobe) {
        eprintln!("Preflight check failed: {}", e);
        return ExitCode::from(EXIT_SETUP_ERROR);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing up (in-flight encodes are asked to stop)");
            signal_token.cancel();
        }
    });

    let orchestrator = Orchestrator::new(
        run_config,
        Arc::new(FfprobeProber::new(config.encoder.ffprobe.clone())),
        Arc::new(FfmpegEncoder::new(config.encoder.ffmpeg.clone())),
        cancel,
    );

    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Run aborted: {}", e);
            return ExitCode::from(EXIT_SETUP_ERROR);
        }
    };

    print!("{}", report.render_summary());

    if let Some(path) = &args.report_json {
        if let Err(e) = report.write_json(path) {
            eprintln!("Failed to write report to {}: {}", path.display(), e);
        }
    }

    ExitCode::from(report.status().exit_code())
}
