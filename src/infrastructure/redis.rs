//! Redis cache implementation.
//!
//! This module provides a Redis-based `SecretCache` using `deadpool-redis`
//! for connection pooling.
//!
//! # Key Design
//!
//! - Secret: `secret:{secret_key}` -> JSON `CachedSecret`, written with `SETEX`
//!
//! Only sealed payloads are ever written to Redis.

use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use crate::domain::SecretKey;
use crate::infrastructure::{CachedSecret, RepositoryError, RepositoryFuture, SecretCache};

/// Prefix for secret keys.
const SECRET_KEY_PREFIX: &str = "secret:";

/// Atomic read-and-delete. `GETDEL` needs Redis 6.2; the script works everywhere.
const TAKE_SCRIPT: &str = r"
local value = redis.call('GET', KEYS[1])
if value then
    redis.call('DEL', KEYS[1])
end
return value
";

/// Generates the Redis key for a secret.
fn secret_cache_key(key: &SecretKey) -> String {
    format!("{SECRET_KEY_PREFIX}{key}")
}

fn cache_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::CacheError(error.to_string())
}

/// Redis implementation of `SecretCache`.
///
/// # Example
///
/// ```ignore
/// let cache = RedisSecretCache::from_url("redis://localhost:6379")?;
/// cache.put(&key, &CachedSecret::from_secret(&secret), 300).await?;
/// let cached = cache.take(&key).await?;
/// ```
#[derive(Clone)]
pub struct RedisSecretCache {
    pool: Pool,
}

impl std::fmt::Debug for RedisSecretCache {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RedisSecretCache")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}

impl RedisSecretCache {
    /// Creates a new cache with the given connection pool.
    #[must_use]
    pub const fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Creates a new cache from a Redis URL.
    ///
    /// The pool connects lazily; use [`SecretCache::ping`] to verify reachability.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::CacheError` if the pool cannot be created.
    pub fn from_url(redis_url: &str) -> Result<Self, RepositoryError> {
        let config = Config::from_url(redis_url);
        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(cache_error)?;
        Ok(Self { pool })
    }
}

#[allow(clippy::significant_drop_tightening)]
impl SecretCache for RedisSecretCache {
    fn put(&self, key: &SecretKey, entry: &CachedSecret, ttl_seconds: u64) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        let cache_key = secret_cache_key(key);
        let entry = entry.clone();

        Box::pin(async move {
            let json = serde_json::to_string(&entry)
                .map_err(|error| RepositoryError::SerializationError(error.to_string()))?;
            let mut connection = pool.get().await.map_err(cache_error)?;

            connection
                .set_ex::<_, _, ()>(&cache_key, json, ttl_seconds.max(1))
                .await
                .map_err(cache_error)?;

            Ok(())
        })
    }

    fn take(&self, key: &SecretKey) -> RepositoryFuture<Option<CachedSecret>> {
        let pool = self.pool.clone();
        let cache_key = secret_cache_key(key);

        Box::pin(async move {
            let mut connection = pool.get().await.map_err(cache_error)?;

            let data: Option<String> = redis::Script::new(TAKE_SCRIPT)
                .key(&cache_key)
                .invoke_async(&mut *connection)
                .await
                .map_err(cache_error)?;

            data.map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(|error| RepositoryError::SerializationError(error.to_string()))
        })
    }

    fn remove(&self, key: &SecretKey) -> RepositoryFuture<bool> {
        let pool = self.pool.clone();
        let cache_key = secret_cache_key(key);

        Box::pin(async move {
            let mut connection = pool.get().await.map_err(cache_error)?;

            let removed: i64 = connection.del(&cache_key).await.map_err(cache_error)?;

            Ok(removed > 0)
        })
    }

    fn ping(&self) -> RepositoryFuture<()> {
        let pool = self.pool.clone();

        Box::pin(async move {
            let mut connection = pool.get().await.map_err(cache_error)?;

            let _: String = redis::cmd("PING")
                .query_async(&mut *connection)
                .await
                .map_err(cache_error)?;

            Ok(())
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
