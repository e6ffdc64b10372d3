//! Fast key-value caching for group reads and pending view counters.
//!
//! - [`KeyValueStore`] is the boundary to the fast cache (Redis in production, an in-process
//!   map in tests and when no Redis URL is configured).
//! - [`ReadThroughCache`] serves list and detail reads from the store and falls back to the
//!   loader on any miss or cache failure.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! key_prefix = "clusters:"
//! list_ttl_seconds = 600
//! entity_ttl_seconds = 3600
//! ```

mod config;
mod keys;
mod read_through;
mod store;

pub use config::CacheConfig;
pub use keys::{CacheKey, VIEWS_KEY_PREFIX, parse_views_key, views_key};
pub use read_through::ReadThroughCache;
pub use store::{CacheError, KeyValueStore, MemoryStore};

pub(crate) const METRIC_CACHE_HIT: &str = "aggregator_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "aggregator_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "aggregator_cache_error_total";
