//! Redis-backed fast key-value cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, Script, aio::ConnectionManager};
use tracing::info;

use crate::cache::{CacheError, KeyValueStore};

use super::error::InfraError;

const SCAN_BATCH: usize = 200;

/// INCR and expiry-on-create in one server-side step.
const INCR_WITH_EXPIRY: &str = r"
local value = redis.call('INCR', KEYS[1])
if value == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return value
";

/// [`KeyValueStore`] over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, InfraError> {
        let client = Client::open(url)
            .map_err(|err| InfraError::cache(format!("invalid redis url: {err}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|err| InfraError::cache(format!("failed to connect to redis: {err}")))?;
        info!("connected to redis");
        Ok(Self {
            conn,
            incr: Script::new(INCR_WITH_EXPIRY),
        })
    }
}

/// Redis expiries are whole seconds; never round a non-zero TTL down to "no expiry".
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn incr_error(key: &str, err: redis::RedisError) -> CacheError {
    let not_integer = matches!(err.kind(), redis::ErrorKind::TypeError)
        || err.to_string().contains("not an integer");
    if not_integer {
        CacheError::NotInteger {
            key: key.to_owned(),
        }
    } else {
        CacheError::backend(err)
    }
}

fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await
            .map_err(CacheError::backend)?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_on_create: Duration) -> Result<i64, CacheError> {
        let mut conn = self.conn.clone();
        let value: i64 = self
            .incr
            .key(key)
            .arg(ttl_secs(ttl_on_create))
            .invoke_async(&mut conn)
            .await
            .map_err(|err| incr_error(key, err))?;
        Ok(value)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let pattern = match_pattern(prefix);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(CacheError::backend)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SCAN may return a key more than once across iterations.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(CacheError::backend)?;
        Ok(removed)
    }
}
