//! Cache configuration
//!
//! Two directives drive the cache: `object_cache_inherit` decides whether a
//! new configuration generation may adopt parsed objects from the previous
//! one, and the `certificate_cache_*` settings size the per-connection
//! cache (`certificate_cache_max = 0` disables it).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::SslObjectCache;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// SSL object cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Allow a new configuration generation to reuse parsed objects from
    /// the previous generation (default: true)
    #[serde(default = "default_inherit")]
    pub object_cache_inherit: bool,

    /// Maximum entries in the per-connection cache; 0 disables it
    #[serde(default)]
    pub certificate_cache_max: usize,

    /// Seconds before a cached file-backed object is re-checked for
    /// freshness (default: 60)
    #[serde(default = "default_cache_valid")]
    pub certificate_cache_valid: u64,

    /// Idle seconds before a connection-cache entry becomes evictable
    /// (default: 10)
    #[serde(default = "default_cache_inactive")]
    pub certificate_cache_inactive: u64,

    /// Prefix that relative file references are resolved against
    #[serde(default)]
    pub prefix: PathBuf,
}

fn default_inherit() -> bool {
    true
}

fn default_cache_valid() -> u64 {
    60
}

fn default_cache_inactive() -> u64 {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            object_cache_inherit: default_inherit(),
            certificate_cache_max: 0,
            certificate_cache_valid: default_cache_valid(),
            certificate_cache_inactive: default_cache_inactive(),
            prefix: PathBuf::new(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: CacheConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.prefix.as_os_str().is_empty() && !self.prefix.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "prefix must be an absolute path: {}",
                self.prefix.display()
            )));
        }
        Ok(())
    }

    /// The configuration-load cache, with inheritance as configured
    pub fn build_config_cache(&self) -> SslObjectCache {
        let mut cache = SslObjectCache::config_cache();
        cache.set_inherit(self.object_cache_inherit);
        cache
    }

    /// The per-connection cache, or `None` when disabled
    pub fn build_connection_cache(&self) -> Option<SslObjectCache> {
        if self.certificate_cache_max == 0 {
            return None;
        }
        Some(SslObjectCache::new(
            self.certificate_cache_max,
            self.certificate_cache_valid,
            self.certificate_cache_inactive,
        ))
    }

    /// Create an example configuration
    pub fn example() -> Self {
        CacheConfig {
            object_cache_inherit: true,
            certificate_cache_max: 1000,
            certificate_cache_valid: 60,
            certificate_cache_inactive: 10,
            prefix: PathBuf::from("/etc/ssl"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert!(config.object_cache_inherit);
        assert_eq!(config.certificate_cache_max, 0);
        assert_eq!(config.certificate_cache_valid, 60);
        assert_eq!(config.certificate_cache_inactive, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_apply_to_missing_fields() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert!(config.object_cache_inherit);
        assert_eq!(config.certificate_cache_valid, 60);
    }

    #[test]
    fn test_relative_prefix_is_invalid() {
        let config = CacheConfig {
            prefix: PathBuf::from("relative/path"),
            ..CacheConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_round_trip_through_file() {
        let temp_file = NamedTempFile::new().unwrap();
        let config = CacheConfig::example();
        config.to_file(temp_file.path()).unwrap();

        let loaded = CacheConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.certificate_cache_max, 1000);
        assert_eq!(loaded.prefix, PathBuf::from("/etc/ssl"));
    }

    #[test]
    fn test_build_caches() {
        let mut config = CacheConfig::default();
        assert!(config.build_connection_cache().is_none());
        assert!(config.build_config_cache().inherit());

        config.certificate_cache_max = 100;
        config.object_cache_inherit = false;
        let conn = config.build_connection_cache().unwrap();
        assert_eq!(conn.stats().max, 100);
        assert!(!config.build_config_cache().inherit());
    }
}
