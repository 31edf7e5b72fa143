use std::time::Duration;

use crate::consensus::ConsensusConfig;
use crate::patterns::RuleThresholds;
use crate::record::ColumnMap;
use crate::sync::SyncConfig;

/// All tuning and wiring in one place, built once at startup and passed
/// into the components that need it. Nothing here mutates after
/// construction.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub columns: ColumnMap,
    pub thresholds: RuleThresholds,
    pub consensus: ConsensusConfig,
    pub sync: Option<SyncConfig>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            columns: ColumnMap::default(),
            thresholds: RuleThresholds::default(),
            consensus: ConsensusConfig::default(),
            sync: None,
        }
    }
}

impl MinerConfig {
    /// Defaults plus environment overrides. `PATTERN_SYNC_URL` enables the
    /// sync bridge; `SYNC_TIMEOUT_SECS` adjusts its wall-clock bound.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("PATTERN_SYNC_URL") {
            if !url.trim().is_empty() {
                let mut sync = SyncConfig::new(url.trim());
                if let Some(secs) = std::env::var("SYNC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|val| val.parse::<u64>().ok())
                {
                    sync.timeout = Duration::from_secs(secs.max(1));
                }
                config.sync = Some(sync);
            }
        }
        config
    }
}
