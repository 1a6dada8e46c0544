//! Cache configuration and status types.
//!
//! The secret cache holds sealed payloads for a short window after creation
//! so that an early read does not need to fetch the payload from `PostgreSQL`.
//!
//! # Key Design
//!
//! - Data key: `secret:{secret_key}` -> JSON `CachedSecret`
//!
//! # TTL
//!
//! Entries live for `min(CACHE_TTL_SECONDS, secret TTL)` so that a cached
//! payload never outlives the secret it belongs to.

use crate::infrastructure::factory::{
    ConfigurationError, EnvLookup, lookup_trimmed, parse_or_default,
};

/// Default lifetime of a cache entry (five minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Outcome of consulting the cache for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Payload was served from the cache.
    Hit,
    /// Cache was consulted but held no entry.
    Miss,
    /// No cache was consulted.
    #[default]
    Bypass,
    /// The cache failed; the request fell back to primary storage.
    Error,
}

impl CacheStatus {
    /// Lowercase label used in headers and audit metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
            Self::Error => "error",
        }
    }
}

/// Which cache backend is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheSource {
    /// Redis.
    Redis,
    /// Process-local memory.
    #[default]
    Memory,
    /// Caching is disabled.
    None,
}

impl CacheSource {
    /// Lowercase label used in the `X-Cache-Source` header and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Memory => "memory",
            Self::None => "none",
        }
    }
}

/// Configuration for cache behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound on the lifetime of a cache entry in seconds.
    pub ttl_seconds: u64,
    /// Whether new secrets are written to the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Creates a new `CacheConfig`.
    ///
    /// A `ttl_seconds` of 0 is raised to 1 because Redis rejects `SETEX 0`.
    #[must_use]
    pub const fn new(ttl_seconds: u64, enabled: bool) -> Self {
        Self {
            ttl_seconds: if ttl_seconds == 0 { 1 } else { ttl_seconds },
            enabled,
        }
    }

    /// Loads the configuration from a variable source.
    ///
    /// - `CACHE_TTL_SECONDS` (default 300)
    /// - `CACHE_ENABLED` (default `true`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidValue` for unparsable values.
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigurationError> {
        let ttl_seconds = parse_or_default(lookup, "CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS)?;

        let enabled = match lookup_trimmed(lookup, "CACHE_ENABLED") {
            None => true,
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        name: "CACHE_ENABLED",
                        value,
                    });
                }
            },
        };

        Ok(Self::new(ttl_seconds, enabled))
    }

    /// Lifetime to use for a secret with the given TTL.
    ///
    /// Never returns 0.
    #[must_use]
    pub fn effective_ttl(&self, secret_ttl_seconds: Option<u64>) -> u64 {
        secret_ttl_seconds
            .map_or(self.ttl_seconds, |secret_ttl| secret_ttl.min(self.ttl_seconds))
            .max(1)
    }
}
