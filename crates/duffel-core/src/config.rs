//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Tunables for [`PackageEngine`](crate::PackageEngine).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// TTL for package build information cache entries, in days.
    pub build_info_ttl_days: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_info_ttl_days: 1,
        }
    }
}

impl EngineConfig {
    /// Cache TTL as a duration.
    pub fn build_info_ttl(&self) -> Duration {
        Duration::from_secs(self.build_info_ttl_days * SECONDS_PER_DAY)
    }
}
