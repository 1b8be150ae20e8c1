use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Result, RouterError};

/// Field handling for the size/count statistics rollup.
///
/// Unknown fields are logged and ignored, never fatal; the lists only decide
/// how recognized fields are combined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RollupFieldPolicy {
    /// Numeric fields summed across shards.
    pub summed: Vec<String>,
    /// Fields copied from the first shard that reports them.
    pub copied_once: Vec<String>,
    /// Fields dropped from the rollup without a warning.
    pub skipped: Vec<String>,
}

impl Default for RollupFieldPolicy {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| s.to_string()).collect();
        Self {
            summed: owned(&["count", "size", "storageSize", "numExtents", "totalIndexSize"]),
            copied_once: owned(&[
                "flags",
                "systemFlags",
                "userFlags",
                "capped",
                "paddingFactorNote",
            ]),
            skipped: owned(&[
                "ns",
                "ok",
                "lastExtentSize",
                "paddingFactor",
                "indexDetails",
                "wiredTiger",
            ]),
        }
    }
}

impl RollupFieldPolicy {
    pub fn is_summed(&self, field: &str) -> bool {
        self.summed.iter().any(|f| f == field)
    }

    pub fn is_copied_once(&self, field: &str) -> bool {
        self.copied_once.iter().any(|f| f == field)
    }

    pub fn is_skipped(&self, field: &str) -> bool {
        self.skipped.iter().any(|f| f == field)
    }
}

/// Router configuration.
///
/// Built with [`RouterConfig::default`] plus builder methods, or loaded from JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RouterConfig {
    /// Upper bound on concurrent per-shard calls in one scatter round.
    pub max_concurrency: usize,

    /// Per-shard call timeout in milliseconds. A timeout counts as a transport failure.
    pub shard_timeout_ms: u64,

    /// Refresh-and-retry budget for single-target passthrough commands.
    pub max_stale_retries: u32,

    /// Result limit for proximity searches that give neither `num` nor `limit`.
    pub default_geo_limit: u64,

    /// Field policy for the statistics rollup.
    pub rollup: RollupFieldPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            shard_timeout_ms: 30_000,
            max_stale_retries: 1,
            default_geo_limit: 100,
            rollup: RollupFieldPolicy::default(),
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fan-out concurrency bound
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the per-shard timeout
    pub fn shard_timeout(mut self, timeout: Duration) -> Self {
        self.shard_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the stale-topology retry budget
    pub fn max_stale_retries(mut self, retries: u32) -> Self {
        self.max_stale_retries = retries;
        self
    }

    /// Set the default proximity-search limit
    pub fn default_geo_limit(mut self, limit: u64) -> Self {
        self.default_geo_limit = limit;
        self
    }

    /// Replace the rollup field policy
    pub fn rollup(mut self, rollup: RollupFieldPolicy) -> Self {
        self.rollup = rollup;
        self
    }

    pub fn shard_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.shard_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(RouterError::BadValue(
                "max_concurrency must be >= 1".to_string(),
            ));
        }
        if self.shard_timeout_ms == 0 {
            return Err(RouterError::BadValue(
                "shard_timeout_ms must be >= 1".to_string(),
            ));
        }
        if self.default_geo_limit == 0 {
            return Err(RouterError::BadValue(
                "default_geo_limit must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| RouterError::BadValue(format!("invalid router config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = RouterConfig::new()
            .max_concurrency(4)
            .shard_timeout(Duration::from_millis(250))
            .max_stale_retries(2);
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.shard_timeout_ms, 250);
        assert_eq!(config.max_stale_retries, 2);
        assert_eq!(config.default_geo_limit, 100);
        config.validate().unwrap();
    }

    #[test]
    fn json_config_fills_missing_fields() {
        let config = RouterConfig::from_json_str(r#"{"max_concurrency": 2}"#).unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_stale_retries, 1);
        assert!(config.rollup.is_summed("count"));
        assert!(config.rollup.is_skipped("wiredTiger"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(RouterConfig::from_json_str(r#"{"max_concurrency": 0}"#).is_err());
    }
}
