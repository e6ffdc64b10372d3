//! Cache configuration.

use std::time::Duration;

const DEFAULT_KEY_PREFIX: &str = "clusters:";
const DEFAULT_LIST_TTL_SECS: u64 = 600;
const DEFAULT_ENTITY_TTL_SECS: u64 = 3600;

/// Read-through cache configuration, resolved from the validated `[cache]` settings.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup is a miss and nothing is written back.
    pub enabled: bool,
    /// Prefix for group keys. Pending view counters are never prefixed.
    pub key_prefix: String,
    /// Expiry for top and realtime list entries.
    pub list_ttl_secs: u64,
    /// Expiry for detail and similar entries.
    pub entity_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            list_ttl_secs: DEFAULT_LIST_TTL_SECS,
            entity_ttl_secs: DEFAULT_ENTITY_TTL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            key_prefix: settings.key_prefix.clone(),
            list_ttl_secs: settings.list_ttl_secs.get(),
            entity_ttl_secs: settings.entity_ttl_secs.get(),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn entity_ttl(&self) -> Duration {
        Duration::from_secs(self.entity_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.key_prefix, "clusters:");
        assert_eq!(config.list_ttl(), Duration::from_secs(600));
        assert_eq!(config.entity_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn disabled_keeps_other_defaults() {
        let config = CacheConfig::disabled();
        assert!(!config.enabled);
        assert_eq!(config.list_ttl_secs, 600);
    }
}
