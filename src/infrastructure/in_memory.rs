//! In-memory repository implementations.
//!
//! These implementations are suitable for development and testing.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Claims take the write lock, so at most one reader consumes a secret
//! - The cache enforces TTLs on access and drops stale entries on `evict_expired`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::domain::{AuditEntry, Availability, Secret, SecretKey, Timestamp};
use crate::infrastructure::{
    AuditLog, CachedSecret, ClaimOutcome, RepositoryError, RepositoryFuture, SecretCache,
    SecretRepository,
};

// =============================================================================
// In-Memory Secret Repository
// =============================================================================

/// In-memory implementation of `SecretRepository`.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretRepository {
    secrets: Arc<RwLock<HashMap<SecretKey, Secret>>>,
}

impl InMemorySecretRepository {
    /// Creates a new empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::significant_drop_tightening)]
impl SecretRepository for InMemorySecretRepository {
    fn insert(&self, secret: &Secret) -> RepositoryFuture<()> {
        let secrets = Arc::clone(&self.secrets);
        let secret = secret.clone();
        Box::pin(async move {
            let mut guard = secrets.write().await;
            if guard.contains_key(&secret.secret_key) {
                return Err(RepositoryError::Conflict(format!(
                    "secret {} already exists",
                    secret.secret_key.redacted()
                )));
            }
            guard.insert(secret.secret_key, secret);
            Ok(())
        })
    }

    fn find_by_key(&self, key: &SecretKey) -> RepositoryFuture<Option<Secret>> {
        let secrets = Arc::clone(&self.secrets);
        let key = *key;
        Box::pin(async move {
            let guard = secrets.read().await;
            Ok(guard.get(&key).cloned())
        })
    }

    fn claim(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<ClaimOutcome> {
        let secrets = Arc::clone(&self.secrets);
        let key = *key;
        let now = *now;
        Box::pin(async move {
            let mut guard = secrets.write().await;
            let Some(secret) = guard.get(&key) else {
                return Ok(ClaimOutcome::Unavailable);
            };

            match secret.availability_at(&now) {
                Availability::Available => {
                    let claimed = secret.clone();
                    guard.insert(key, claimed.clone().mark_accessed(now));
                    Ok(ClaimOutcome::Claimed(claimed))
                }
                Availability::Expired => Ok(ClaimOutcome::Expired),
                Availability::Consumed | Availability::Deleted => Ok(ClaimOutcome::Unavailable),
            }
        })
    }

    fn mark_deleted(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<bool> {
        let secrets = Arc::clone(&self.secrets);
        let key = *key;
        let now = *now;
        Box::pin(async move {
            let mut guard = secrets.write().await;
            match guard.get(&key) {
                Some(secret) if !secret.is_deleted() => {
                    let deleted = secret.clone().mark_deleted(now);
                    guard.insert(key, deleted);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }

    fn purge_expired(&self, now: &Timestamp) -> RepositoryFuture<u64> {
        let secrets = Arc::clone(&self.secrets);
        let now = *now;
        Box::pin(async move {
            let mut guard = secrets.write().await;
            let mut purged = 0;
            for secret in guard.values_mut() {
                if secret.availability_at(&now) == Availability::Expired
                    && !secret.ciphertext.is_empty()
                {
                    *secret = secret.clone().scrubbed();
                    purged += 1;
                }
            }
            Ok(purged)
        })
    }

    fn ping(&self) -> RepositoryFuture<()> {
        Box::pin(async { Ok(()) })
    }
}

// =============================================================================
// In-Memory Audit Log
// =============================================================================

/// In-memory implementation of `AuditLog`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditLog {
    /// Creates a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> RepositoryFuture<()> {
        let entries = Arc::clone(&self.entries);
        let entry = entry.clone();
        Box::pin(async move {
            entries.write().await.push(entry);
            Ok(())
        })
    }

    fn list_for_secret(&self, key: &SecretKey) -> RepositoryFuture<Vec<AuditEntry>> {
        let entries = Arc::clone(&self.entries);
        let key = *key;
        Box::pin(async move {
            let guard = entries.read().await;
            Ok(guard
                .iter()
                .filter(|entry| entry.secret_key == key)
                .cloned()
                .collect())
        })
    }
}

// =============================================================================
// In-Memory Secret Cache
// =============================================================================

#[derive(Debug, Clone)]
struct CacheSlot {
    entry: CachedSecret,
    deadline: Instant,
}

/// In-memory implementation of `SecretCache` with lazy TTL eviction.
#[derive(Debug, Clone, Default)]
pub struct InMemorySecretCache {
    slots: Arc<RwLock<HashMap<SecretKey, CacheSlot>>>,
}

impl InMemorySecretCache {
    /// Creates a new empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

}

#[allow(clippy::significant_drop_tightening)]
impl SecretCache for InMemorySecretCache {
    fn put(&self, key: &SecretKey, entry: &CachedSecret, ttl_seconds: u64) -> RepositoryFuture<()> {
        let slots = Arc::clone(&self.slots);
        let key = *key;
        let slot = CacheSlot {
            entry: entry.clone(),
            deadline: Instant::now() + Duration::from_secs(ttl_seconds.max(1)),
        };
        Box::pin(async move {
            slots.write().await.insert(key, slot);
            Ok(())
        })
    }

    fn take(&self, key: &SecretKey) -> RepositoryFuture<Option<CachedSecret>> {
        let slots = Arc::clone(&self.slots);
        let key = *key;
        Box::pin(async move {
            let slot = slots.write().await.remove(&key);
            Ok(slot
                .filter(|slot| slot.deadline > Instant::now())
                .map(|slot| slot.entry))
        })
    }

    fn remove(&self, key: &SecretKey) -> RepositoryFuture<bool> {
        let slots = Arc::clone(&self.slots);
        let key = *key;
        Box::pin(async move {
            let slot = slots.write().await.remove(&key);
            Ok(slot.is_some_and(|slot| slot.deadline > Instant::now()))
        })
    }

    fn ping(&self) -> RepositoryFuture<()> {
        Box::pin(async { Ok(()) })
    }

    fn evict_expired(&self) -> RepositoryFuture<u64> {
        let slots = Arc::clone(&self.slots);
        Box::pin(async move {
            let mut guard = slots.write().await;
            let before = guard.len();
            let now = Instant::now();
            guard.retain(|_, slot| slot.deadline > now);
            Ok(u64::try_from(before - guard.len()).unwrap_or(u64::MAX))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
