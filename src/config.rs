// Search configuration: timeouts, result limits and every cap the pipeline
// stages run under, loadable from JSON.

use crate::cache::{CacheConfig, CacheTtlPolicy};
use crate::connection::{ConnectionOverrides, ConnectionPolicy, HARD_MAX_CONNECTION_MINUTES};
use crate::pricing::PricingConfig;
use crate::stitcher::StitchConfig;
use crate::validator::DurationLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub provider_timeout_ms: u64,
    // Whole-pipeline deadline imposed by the caller
    pub search_timeout_ms: Option<u64>,
    pub max_results: usize,
    pub virtual_interlining: bool,
    pub min_connection_ms: Option<u64>,
    pub max_connection_ms: Option<u64>,
    pub connection: ConnectionPolicy,
    pub stitching: StitchConfig,
    pub pricing: PricingConfig,
    pub cache: CacheConfig,
    pub cache_ttl: CacheTtlPolicy,
    pub duration: DurationLimits,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: 30_000,
            search_timeout_ms: None,
            max_results: 20,
            virtual_interlining: true,
            min_connection_ms: None,
            max_connection_ms: None,
            connection: ConnectionPolicy::default(),
            stitching: StitchConfig::default(),
            pricing: PricingConfig::default(),
            cache: CacheConfig::default(),
            cache_ttl: CacheTtlPolicy::default(),
            duration: DurationLimits::default(),
        }
    }
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SearchConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        self.search_timeout_ms.map(Duration::from_millis)
    }

    pub fn connection_overrides(&self) -> ConnectionOverrides {
        ConnectionOverrides::new(self.min_connection_ms, self.max_connection_ms)
    }

    /// Rejects settings no search could run under.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_timeout_ms == 0 {
            return Err(invalid("provider_timeout_ms", "must be positive"));
        }
        if self.search_timeout_ms == Some(0) {
            return Err(invalid("search_timeout_ms", "must be positive"));
        }
        if self.max_results == 0 {
            return Err(invalid("max_results", "must be positive"));
        }
        if let (Some(min), Some(max)) = (self.min_connection_ms, self.max_connection_ms) {
            if min > max {
                return Err(invalid(
                    "min_connection_ms",
                    format!("{min} exceeds max_connection_ms {max}"),
                ));
            }
        }

        let policy = &self.connection;
        if policy.max_connection_minutes <= 0
            || policy.max_connection_minutes > HARD_MAX_CONNECTION_MINUTES
        {
            return Err(invalid(
                "connection.max_connection_minutes",
                format!("must be within 1..={HARD_MAX_CONNECTION_MINUTES}"),
            ));
        }
        let minimums = [
            policy.default_minutes,
            policy.international_minutes,
            policy.large_hub_minutes,
            policy.airport_change_minutes,
            policy.virtual_interline_minutes,
        ];
        if minimums
            .iter()
            .any(|&m| m < 0 || m > policy.max_connection_minutes)
        {
            return Err(invalid(
                "connection",
                "minimum connection times must fit under max_connection_minutes",
            ));
        }

        if !(0.0..1.0).contains(&self.pricing.tax_rate) {
            return Err(invalid("pricing.tax_rate", "must be within [0, 1)"));
        }
        if self.stitching.max_combinations_per_hub == 0 {
            return Err(invalid("stitching.max_combinations_per_hub", "must be positive"));
        }
        if self.cache.max_size_mb == 0 {
            return Err(invalid("cache.max_size_mb", "must be positive"));
        }
        if self.duration.max_segment_minutes <= 0 || self.duration.max_total_minutes <= 0 {
            return Err(invalid("duration", "limits must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert_eq!(config.search_timeout(), None);
        assert_eq!(config.max_results, 20);
        assert!(config.virtual_interlining);
        assert_eq!(config.stitching.max_hubs, 10);
        assert_eq!(config.stitching.max_combinations_per_hub, 50);
        assert_eq!(config.stitching.max_multi_hub_results, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SearchConfig::from_json(
            r#"{
                "provider_timeout_ms": 5000,
                "max_results": 5,
                "stitching": { "max_hubs": 4, "strategy": "capped_cross_product" },
                "pricing": { "tax_rate": 0.1 },
                "cache": { "eviction_policy": "least_frequently_used" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.provider_timeout_ms, 5000);
        assert_eq!(config.max_results, 5);
        assert_eq!(config.stitching.max_hubs, 4);
        assert_eq!(config.stitching.min_hub_frequency, 3);
        assert_eq!(config.pricing.tax_rate, 0.1);
        assert_eq!(config.pricing.default_booking_fee, 50.0);
        assert_eq!(config.connection, ConnectionPolicy::default());
    }

    #[test]
    fn test_rejects_inverted_caller_bounds() {
        let result = SearchConfig::from_json(
            r#"{ "min_connection_ms": 7200000, "max_connection_ms": 3600000 }"#,
        );
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "min_connection_ms", .. })
        ));
    }

    #[test]
    fn test_rejects_unusable_limits() {
        let mut config = SearchConfig::default();
        config.max_results = 0;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.connection.max_connection_minutes = 2 * HARD_MAX_CONNECTION_MINUTES;
        assert!(config.validate().is_err());

        let mut config = SearchConfig::default();
        config.pricing.tax_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            SearchConfig::from_json("{ nope"),
            Err(ConfigError::JsonParseError(_))
        ));
    }
}
