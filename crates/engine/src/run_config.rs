//! Immutable per-run settings, built once from validated configuration.

use crate::concurrency::{ConcurrencyMode, ConcurrencyPlan};
use crate::config::{Config, ConfigError};
use crate::crf::CrfPolicy;
use crate::encode::AccelerationHint;
use std::path::{Path, PathBuf};

/// Everything the orchestrator needs to know about a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    root_directory: PathBuf,
    concurrency_mode: ConcurrencyMode,
    crf_override: Option<u8>,
    crf_policy: CrfPolicy,
    acceleration: AccelerationHint,
    extensions: Vec<String>,
}

impl RunConfiguration {
    /// Validate `config` and freeze it together with the root directory.
    ///
    /// Fails with [`ConfigError`] before anything touches the filesystem.
    pub fn from_config(root_directory: impl Into<PathBuf>, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        let plan = ConcurrencyPlan::derive(&config.run)?;
        if plan.oversubscribed() {
            tracing::warn!(
                "Worker pool of {} exceeds {} logical cores; encoders will compete for CPU",
                plan.mode.max_active(),
                plan.total_cores
            );
        }

        Ok(Self {
            root_directory: root_directory.into(),
            concurrency_mode: plan.mode,
            crf_override: config.run.crf,
            crf_policy: CrfPolicy::from_config(&config.crf)?,
            acceleration: AccelerationHint::from(config.encoder.acceleration),
            extensions: config.scan.extensions.clone(),
        })
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    pub fn concurrency_mode(&self) -> ConcurrencyMode {
        self.concurrency_mode
    }

    pub fn crf_override(&self) -> Option<u8> {
        self.crf_override
    }

    pub fn crf_policy(&self) -> &CrfPolicy {
        &self.crf_policy
    }

    pub fn acceleration(&self) -> AccelerationHint {
        self.acceleration
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }
}
