//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Lowest CRF accepted anywhere in the configuration.
pub const MIN_CRF: u8 = 18;
/// Highest CRF accepted anywhere in the configuration.
pub const MAX_CRF: u8 = 28;
/// Pool size used when pooled mode is requested without a worker count.
pub const DEFAULT_POOL_WORKERS: u32 = 2;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// CRF override outside [MIN_CRF, MAX_CRF]
    InvalidCrf(u8),
    /// Worker count unusable for pooled mode
    InvalidWorkers(u32),
    /// CRF tier table is empty, unordered or out of range
    InvalidCrfTable(String),
    /// Extension list is empty or has blank entries
    InvalidExtensions(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::InvalidCrf(crf) => write!(
                f,
                "CRF {} is out of range, expected {}-{}",
                crf, MIN_CRF, MAX_CRF
            ),
            ConfigError::InvalidWorkers(n) => {
                write!(f, "Worker count {} is invalid, expected at least 1", n)
            }
            ConfigError::InvalidCrfTable(msg) => write!(f, "Invalid CRF tier table: {}", msg),
            ConfigError::InvalidExtensions(msg) => write!(f, "Invalid extension list: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How tasks are scheduled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One task at a time, in scan order
    #[default]
    Sequential,
    /// A fixed-size worker pool
    Pooled,
}

impl RunMode {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" => Some(RunMode::Sequential),
            "pooled" | "parallel" => Some(RunMode::Pooled),
            _ => None,
        }
    }
}

/// Run-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,
    /// Pool size when `mode = "pooled"`
    #[serde(default = "default_workers")]
    pub workers: u32,
    /// Fixed CRF for every task; computed per task when absent
    #[serde(default)]
    pub crf: Option<u8>,
}

fn default_workers() -> u32 {
    DEFAULT_POOL_WORKERS
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            workers: default_workers(),
            crf: None,
        }
    }
}

/// Hardware acceleration hint handed to the encoder
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Acceleration {
    /// Ask the encoder for hardware encoding, falling back to software
    #[default]
    Auto,
    /// Always encode in software
    Software,
}

impl Acceleration {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" | "gpu" | "hardware" => Some(Acceleration::Auto),
            "software" | "cpu" | "none" => Some(Acceleration::Software),
            _ => None,
        }
    }
}

/// External tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default)]
    pub acceleration: Acceleration,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            acceleration: Acceleration::default(),
        }
    }
}

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Recognized video extensions, without the leading dot (case-insensitive)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

/// Canonical form of an extension entry: trimmed, no leading dots, lowercase
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').trim().to_lowercase()
}

fn default_extensions() -> Vec<String> {
    ["mp4", "mov", "mkv", "avi", "flv", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
        }
    }
}

/// One row of the CRF policy table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrfTier {
    /// Largest video height (pixels) covered by this tier
    pub max_height: u32,
    pub crf: u8,
}

/// CRF policy table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrfConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<CrfTier>,
}

fn default_tiers() -> Vec<CrfTier> {
    vec![
        CrfTier { max_height: 480, crf: 28 },
        CrfTier { max_height: 720, crf: 27 },
        CrfTier { max_height: 1080, crf: 26 },
        CrfTier { max_height: 1440, crf: 25 },
        CrfTier { max_height: 2160, crf: 24 },
    ]
}

impl Default for CrfConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub crf: CrfConfig,
}

/// Checks that a CRF lies in the accepted range.
pub fn validate_crf(crf: u8) -> Result<u8, ConfigError> {
    if (MIN_CRF..=MAX_CRF).contains(&crf) {
        Ok(crf)
    } else {
        Err(ConfigError::InvalidCrf(crf))
    }
}

/// Checks that a tier table describes a total, monotonic policy.
///
/// Thresholds must be strictly increasing and CRFs must never increase
/// with height, all within [MIN_CRF, MAX_CRF].
pub fn validate_tiers(tiers: &[CrfTier]) -> Result<(), ConfigError> {
    if tiers.is_empty() {
        return Err(ConfigError::InvalidCrfTable("table is empty".to_string()));
    }

    for tier in tiers {
        if validate_crf(tier.crf).is_err() {
            return Err(ConfigError::InvalidCrfTable(format!(
                "CRF {} for height {} is outside {}-{}",
                tier.crf, tier.max_height, MIN_CRF, MAX_CRF
            )));
        }
    }

    for pair in tiers.windows(2) {
        if pair[1].max_height <= pair[0].max_height {
            return Err(ConfigError::InvalidCrfTable(format!(
                "heights must be strictly increasing ({} then {})",
                pair[0].max_height, pair[1].max_height
            )));
        }
        if pair[1].crf > pair[0].crf {
            return Err(ConfigError::InvalidCrfTable(format!(
                "CRF must not increase with height ({} at {}p, {} at {}p)",
                pair[0].crf, pair[0].max_height, pair[1].crf, pair[1].max_height
            )));
        }
    }

    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - H265_MODE -> run.mode
    /// - H265_WORKERS -> run.workers
    /// - H265_CRF -> run.crf
    /// - H265_FFMPEG -> encoder.ffmpeg
    /// - H265_FFPROBE -> encoder.ffprobe
    /// - H265_ACCELERATION -> encoder.acceleration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("H265_MODE") {
            if let Some(mode) = RunMode::parse(&val) {
                self.run.mode = mode;
            }
        }

        if let Ok(val) = env::var("H265_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.run.workers = workers;
            }
        }

        if let Ok(val) = env::var("H265_CRF") {
            if let Ok(crf) = val.parse::<u8>() {
                self.run.crf = Some(crf);
            }
        }

        if let Ok(val) = env::var("H265_FFMPEG") {
            if !val.is_empty() {
                self.encoder.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("H265_FFPROBE") {
            if !val.is_empty() {
                self.encoder.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("H265_ACCELERATION") {
            if let Some(accel) = Acceleration::parse(&val) {
                self.encoder.acceleration = accel;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`], but starts from defaults when no file is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }

    /// Reject values that cannot produce a valid run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(crf) = self.run.crf {
            validate_crf(crf)?;
        }

        if self.run.mode == RunMode::Pooled && self.run.workers == 0 {
            return Err(ConfigError::InvalidWorkers(self.run.workers));
        }

        validate_tiers(&self.crf.tiers)?;

        if self.scan.extensions.is_empty() {
            return Err(ConfigError::InvalidExtensions("list is empty".to_string()));
        }
        if self
            .scan
            .extensions
            .iter()
            .any(|ext| normalize_extension(ext).is_empty())
        {
            return Err(ConfigError::InvalidExtensions(
                "entries must not be blank".to_string(),
            ));
        }

        Ok(())
    }
}
