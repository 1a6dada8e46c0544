//! Repository traits for secrets, the audit log and the secret cache.
//!
//! All methods return boxed `'static` futures so that implementations can be
//! held as trait objects and the returned work can be moved across tasks.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AuditEntry, Secret, SecretKey, Timestamp};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone)]
pub enum RepositoryError {
    /// Entity was not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// An entity with the same key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cache operation error.
    #[error("Cache error: {0}")]
    CacheError(String),
}

/// Future returned by every repository operation.
pub type RepositoryFuture<T> = BoxFuture<'static, Result<T, RepositoryError>>;

// =============================================================================
// Secret Repository
// =============================================================================

/// Result of attempting to consume a secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller won the one permitted read. Carries the record as it was
    /// before the claim, ciphertext intact.
    Claimed(Secret),
    /// The secret exists, is unread, but its TTL has elapsed.
    Expired,
    /// Unknown key, or the secret was already read or deleted.
    Unavailable,
}

/// Durable storage for secrets.
pub trait SecretRepository: Send + Sync {
    /// Inserts a new secret.
    ///
    /// Returns `RepositoryError::Conflict` if the key is already taken.
    fn insert(&self, secret: &Secret) -> RepositoryFuture<()>;

    /// Finds a secret by key regardless of its state.
    fn find_by_key(&self, key: &SecretKey) -> RepositoryFuture<Option<Secret>>;

    /// Atomically consumes a secret.
    ///
    /// Across all concurrent callers at most one ever receives
    /// [`ClaimOutcome::Claimed`] for a given key. The stored ciphertext is
    /// scrubbed as part of the claim.
    fn claim(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<ClaimOutcome>;

    /// Marks a secret as deleted and scrubs its ciphertext.
    ///
    /// Returns `Ok(false)` if the key is unknown or already deleted.
    fn mark_deleted(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<bool>;

    /// Scrubs the ciphertext of every unread, undeleted secret whose TTL
    /// elapsed before `now`.
    ///
    /// Purged secrets keep their lifecycle state: reads still report them as
    /// expired and their owners can still delete them. Returns the number of
    /// secrets scrubbed.
    fn purge_expired(&self, now: &Timestamp) -> RepositoryFuture<u64>;

    /// Checks that the backend is reachable.
    fn ping(&self) -> RepositoryFuture<()>;
}

// =============================================================================
// Audit Log
// =============================================================================

/// Append-only audit trail.
pub trait AuditLog: Send + Sync {
    /// Appends an entry.
    fn append(&self, entry: &AuditEntry) -> RepositoryFuture<()>;

    /// Returns all entries for a secret, oldest first.
    fn list_for_secret(&self, key: &SecretKey) -> RepositoryFuture<Vec<AuditEntry>>;
}

// =============================================================================
// Secret Cache
// =============================================================================

/// Cached form of a secret. Only ever holds the sealed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSecret {
    pub ciphertext: String,
    pub expires_at: Option<Timestamp>,
}

impl CachedSecret {
    /// Builds the cache entry for a freshly stored secret.
    #[must_use]
    pub fn from_secret(secret: &Secret) -> Self {
        Self {
            ciphertext: secret.ciphertext.clone(),
            expires_at: secret.expires_at,
        }
    }

    /// Returns `true` if the cached secret's TTL elapsed before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < *now)
    }
}

/// Short-lived cache in front of [`SecretRepository`].
///
/// Losing the cache never loses a secret; the repository is authoritative.
pub trait SecretCache: Send + Sync {
    /// Stores an entry that disappears after `ttl_seconds`.
    fn put(&self, key: &SecretKey, entry: &CachedSecret, ttl_seconds: u64)
    -> RepositoryFuture<()>;

    /// Atomically reads and removes an entry.
    fn take(&self, key: &SecretKey) -> RepositoryFuture<Option<CachedSecret>>;

    /// Removes an entry. Returns `Ok(true)` if one was present.
    fn remove(&self, key: &SecretKey) -> RepositoryFuture<bool>;

    /// Checks that the backend is reachable.
    fn ping(&self) -> RepositoryFuture<()>;

    /// Drops entries whose TTL has elapsed. Returns the number dropped.
    ///
    /// Backends that expire keys on their own keep this default.
    fn evict_expired(&self) -> RepositoryFuture<u64> {
        Box::pin(async { Ok(0) })
    }
}

/// Cache that stores nothing. Used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSecretCache;

impl SecretCache for NoopSecretCache {
    fn put(&self, _key: &SecretKey, _entry: &CachedSecret, _ttl: u64) -> RepositoryFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn take(&self, _key: &SecretKey) -> RepositoryFuture<Option<CachedSecret>> {
        Box::pin(async { Ok(None) })
    }

    fn remove(&self, _key: &SecretKey) -> RepositoryFuture<bool> {
        Box::pin(async { Ok(false) })
    }

    fn ping(&self) -> RepositoryFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_repository_error_display() {
        let error = RepositoryError::NotFound("abc".to_string());
        assert_eq!(format!("{error}"), "Entity not found: abc");

        let error = RepositoryError::Conflict("duplicate key".to_string());
        assert_eq!(format!("{error}"), "Conflict: duplicate key");

        let error = RepositoryError::DatabaseError("connection refused".to_string());
        assert_eq!(format!("{error}"), "Database error: connection refused");
    }

    #[rstest]
    fn test_cached_secret_from_secret() {
        let now = Timestamp::now();
        let secret = Secret::new(SecretKey::generate(), "sealed", now)
            .with_expires_at(now.plus_seconds(10));
        let cached = CachedSecret::from_secret(&secret);
        assert_eq!(cached.ciphertext, "sealed");
        assert_eq!(cached.expires_at, secret.expires_at);
        assert!(!cached.is_expired_at(&now.plus_seconds(10)));
        assert!(cached.is_expired_at(&now.plus_seconds(11)));
    }

    #[rstest]
    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopSecretCache;
        let key = SecretKey::generate();
        let entry = CachedSecret {
            ciphertext: "sealed".to_string(),
            expires_at: None,
        };
        cache.put(&key, &entry, 60).await.unwrap();
        assert!(cache.take(&key).await.unwrap().is_none());
        assert!(!cache.remove(&key).await.unwrap());
        assert_eq!(cache.evict_expired().await.unwrap(), 0);
    }
}
