//! CRF selection by video height.
//!
//! The policy is a table of `{max_height -> crf}` tiers. A height picks the
//! smallest threshold that is >= the height, or the last tier when it exceeds
//! every threshold, so the mapping is total. Tables are validated to be
//! strictly increasing in height and non-increasing in CRF, which makes the
//! mapping monotonic: taller video never gets a higher CRF.

use crate::config::{validate_tiers, ConfigError, CrfConfig, CrfTier, MAX_CRF, MIN_CRF};

/// Validated CRF tier table.
#[derive(Debug, Clone, PartialEq)]
pub struct CrfPolicy {
    tiers: Vec<CrfTier>,
    top: CrfTier,
}

impl Default for CrfPolicy {
    fn default() -> Self {
        let tiers = CrfConfig::default().tiers;
        let top = tiers.last().copied().unwrap_or(CrfTier {
            max_height: u32::MAX,
            crf: MAX_CRF,
        });
        Self { tiers, top }
    }
}

impl CrfPolicy {
    /// Build a policy from a tier table, rejecting tables that are not total and monotonic.
    pub fn new(tiers: Vec<CrfTier>) -> Result<Self, ConfigError> {
        validate_tiers(&tiers)?;
        let top = match tiers.last() {
            Some(tier) => *tier,
            None => return Err(ConfigError::InvalidCrfTable("table is empty".to_string())),
        };
        Ok(Self { tiers, top })
    }

    pub fn from_config(cfg: &CrfConfig) -> Result<Self, ConfigError> {
        Self::new(cfg.tiers.clone())
    }

    pub fn tiers(&self) -> &[CrfTier] {
        &self.tiers
    }

    /// CRF for a probed height.
    pub fn crf_for_height(&self, height: u32) -> u8 {
        self.tiers
            .iter()
            .find(|tier| height <= tier.max_height)
            .unwrap_or(&self.top)
            .crf
    }

    /// Resolve the CRF for a task: a fixed override wins, otherwise the tier table.
    ///
    /// Overrides are validated when the configuration is built; the clamp only
    /// keeps the result inside [MIN_CRF, MAX_CRF].
    pub fn resolve(&self, height: u32, override_crf: Option<u8>) -> u8 {
        match override_crf {
            Some(crf) => crf.clamp(MIN_CRF, MAX_CRF),
            None => self.crf_for_height(height),
        }
    }
}
