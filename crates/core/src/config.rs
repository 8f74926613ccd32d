//! Process-level defaults for new progress nodes.

use crate::error::{ProgressError, Result};
use crate::unit::{Granularity, UnitCount};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding `default_granularity`.
pub const ENV_GRANULARITY: &str = "PROGTREE_GRANULARITY";

/// Environment variable overriding `default_total_unit_count`.
pub const ENV_TOTAL_UNIT_COUNT: &str = "PROGTREE_TOTAL_UNIT_COUNT";

/// Configuration for progress nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Granularity for nodes created from this config
    pub default_granularity: f64,

    /// Total unit count for nodes created from this config
    pub default_total_unit_count: UnitCount,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            default_granularity: Granularity::DEFAULT.get(),
            default_total_unit_count: 100,
        }
    }
}

impl ProgressConfig {
    /// Parse from a JSON string. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Apply `PROGTREE_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(raw) = lookup(ENV_GRANULARITY) {
            self.default_granularity = raw.trim().parse().map_err(|_| {
                ProgressError::InvalidConfig(format!("{ENV_GRANULARITY}={raw} is not a number"))
            })?;
        }
        if let Some(raw) = lookup(ENV_TOTAL_UNIT_COUNT) {
            self.default_total_unit_count = raw.trim().parse().map_err(|_| {
                ProgressError::InvalidConfig(format!("{ENV_TOTAL_UNIT_COUNT}={raw} is not an integer"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        Granularity::new(self.default_granularity).map_err(|_| {
            ProgressError::InvalidConfig(format!(
                "default_granularity {} must be in (0, 1]",
                self.default_granularity
            ))
        })?;
        Ok(())
    }

    /// Validated granularity.
    pub fn granularity(&self) -> Result<Granularity> {
        Granularity::new(self.default_granularity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ProgressConfig::default();
        assert_eq!(config.default_granularity, 0.01);
        assert_eq!(config.default_total_unit_count, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ProgressConfig::from_json_str(r#"{"default_granularity": 0.05}"#).unwrap();
        assert_eq!(config.default_granularity, 0.05);
        assert_eq!(config.default_total_unit_count, 100);
    }

    #[test]
    fn test_out_of_range_json_rejected() {
        let err = ProgressConfig::from_json_str(r#"{"default_granularity": 0}"#).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidConfig(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_GRANULARITY, "0.2"), (ENV_TOTAL_UNIT_COUNT, " 40 ")]);
        let config = ProgressConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.default_granularity, 0.2);
        assert_eq!(config.default_total_unit_count, 40);
    }

    #[test]
    fn test_bad_override_rejected() {
        let err = ProgressConfig::default()
            .with_overrides(|key| (key == ENV_GRANULARITY).then(|| "fast".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_GRANULARITY));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ProgressConfig::load("/nonexistent/progtree.json").unwrap_err();
        assert!(matches!(err, ProgressError::Io(_)));
    }
}
