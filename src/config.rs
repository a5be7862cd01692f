//! World configuration
//!
//! ```
//! use partition_ecs::config::WorldConfig;
//!
//! let config = WorldConfig::from_json_str(r#"{ "query_cache": true }"#).unwrap();
//! assert!(config.query_cache);
//! assert_eq!(config.query_cache_capacity, 128);
//! ```

use std::num::NonZeroUsize;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, Result};

/// Tunables for a [`World`](crate::World)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Memoize multi-component query results between structural mutations
    pub query_cache: bool,
    /// Maximum number of distinct query signatures kept in the cache
    pub query_cache_capacity: usize,
    /// Entity slots to pre-allocate
    pub entity_capacity: usize,
    /// Priority used by `World::add_processor_default`
    pub default_priority: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            query_cache: false,
            query_cache_capacity: 128,
            entity_capacity: 0,
            default_priority: 0,
        }
    }
}

impl WorldConfig {
    /// Plain world with the query cache switched on
    pub fn cached() -> Self {
        Self {
            query_cache: true,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_cache_capacity == 0 {
            return Err(EcsError::Config(
                "query_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = WorldConfig::from_json_str("{}").unwrap();
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = WorldConfig::from_json_str(r#"{ "query_cache_capacity": 0 }"#).unwrap_err();
        assert!(matches!(err, EcsError::Config(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(WorldConfig::from_json_str("{ query_cache: ").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = WorldConfig::from_json_file("does/not/exist.json").unwrap_err();
        assert!(matches!(err, EcsError::Config(_)));
    }

    #[test]
    fn test_round_trip_through_serde() {
        let config = WorldConfig {
            query_cache: true,
            query_cache_capacity: 8,
            entity_capacity: 1024,
            default_priority: 3,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(WorldConfig::from_json_str(&json).unwrap(), config);
    }
}
