//! Cache key definitions.

use std::time::Duration;

use super::config::CacheConfig;

/// Prefix shared by every pending view counter.
pub const VIEWS_KEY_PREFIX: &str = "views:";

/// Key of a cached group read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Top { limit: u32 },
    Realtime { limit: u32, realtime: bool },
    Similar { id: u64, limit: u32 },
    Detail { id: u64 },
}

impl CacheKey {
    /// Render the storage key under `prefix`.
    pub fn render(&self, prefix: &str) -> String {
        match self {
            CacheKey::Top { limit } => format!("{prefix}top:{limit}"),
            CacheKey::Realtime {
                limit,
                realtime: true,
            } => format!("{prefix}rt:{limit}"),
            CacheKey::Realtime {
                limit,
                realtime: false,
            } => format!("{prefix}not_rt:{limit}"),
            CacheKey::Similar { id, limit } => format!("{prefix}similar:{id}:{limit}"),
            CacheKey::Detail { id } => format!("{prefix}{id}"),
        }
    }

    pub fn ttl(&self, config: &CacheConfig) -> Duration {
        match self {
            CacheKey::Top { .. } | CacheKey::Realtime { .. } => config.list_ttl(),
            CacheKey::Similar { .. } | CacheKey::Detail { .. } => config.entity_ttl(),
        }
    }

    /// Metric label for the key family.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Top { .. } => "top",
            CacheKey::Realtime { .. } => "realtime",
            CacheKey::Similar { .. } => "similar",
            CacheKey::Detail { .. } => "detail",
        }
    }
}

pub fn views_key(id: u64) -> String {
    format!("{VIEWS_KEY_PREFIX}{id}")
}

/// Group id encoded in a pending view key, if the key is well formed.
pub fn parse_views_key(key: &str) -> Option<u64> {
    key.strip_prefix(VIEWS_KEY_PREFIX)?.parse().ok()
}
