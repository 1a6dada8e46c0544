//! Infrastructure module for external services.
//!
//! This module contains database repositories, cache implementations,
//! payload encryption, and backend selection.

pub mod cache;
pub mod crypto;
pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod redis;
pub mod repository;

pub use cache::{CacheConfig, CacheSource, CacheStatus};
pub use crypto::{CryptoError, SecretCipher, hash_passphrase, verify_passphrase};
pub use factory::{
    CacheMode, ConfigurationError, FactoryError, Repositories, RepositoryConfig,
    RepositoryConfigBuilder, RepositoryFactory, StorageMode,
};
pub use in_memory::{InMemoryAuditLog, InMemorySecretCache, InMemorySecretRepository};
pub use postgres::{PostgresAuditLog, PostgresSecretRepository};
pub use redis::RedisSecretCache;
pub use repository::{
    AuditLog, CachedSecret, ClaimOutcome, NoopSecretCache, RepositoryError, RepositoryFuture,
    SecretCache, SecretRepository,
};
