//! `PostgreSQL` repository implementations.
//!
//! This module provides `PostgreSQL`-based implementations of the repository traits
//! using `sqlx` for database operations. `PostgreSQL` is the authoritative store;
//! Redis only ever caches sealed payloads.
//!
//! # Table Schema
//!
//! ```sql
//! CREATE TABLE secrets (
//!     secret_key UUID PRIMARY KEY,
//!     ciphertext TEXT NOT NULL,
//!     passphrase_hash TEXT,
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
//!     expires_at TIMESTAMPTZ,
//!     accessed_at TIMESTAMPTZ,
//!     deleted_at TIMESTAMPTZ
//! );
//!
//! CREATE TABLE secret_logs (
//!     id UUID PRIMARY KEY,
//!     secret_key UUID NOT NULL REFERENCES secrets(secret_key),
//!     action VARCHAR(16) NOT NULL,
//!     ip_address TEXT NOT NULL,
//!     created_at TIMESTAMPTZ NOT NULL,
//!     metadata JSONB
//! );
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::domain::{AuditAction, AuditEntry, AuditEntryId, Secret, SecretKey, Timestamp};
use crate::infrastructure::{
    AuditLog, ClaimOutcome, RepositoryError, RepositoryFuture, SecretRepository,
};

/// DDL applied at startup. Every statement is idempotent.
const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS secrets (
        secret_key UUID PRIMARY KEY,
        ciphertext TEXT NOT NULL,
        passphrase_hash TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        expires_at TIMESTAMPTZ,
        accessed_at TIMESTAMPTZ,
        deleted_at TIMESTAMPTZ
    )",
    "CREATE INDEX IF NOT EXISTS idx_secrets_pending_expiry ON secrets (expires_at) \
     WHERE accessed_at IS NULL AND deleted_at IS NULL AND expires_at IS NOT NULL",
    "CREATE TABLE IF NOT EXISTS secret_logs (
        id UUID PRIMARY KEY,
        secret_key UUID NOT NULL REFERENCES secrets(secret_key),
        action VARCHAR(16) NOT NULL,
        ip_address TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        metadata JSONB
    )",
    "ALTER TABLE secret_logs ALTER COLUMN ip_address TYPE TEXT",
    "CREATE INDEX IF NOT EXISTS idx_secret_logs_secret_key ON secret_logs (secret_key, created_at)",
];

const SECRET_COLUMNS: &str =
    "secret_key, ciphertext, passphrase_hash, created_at, expires_at, accessed_at, deleted_at";

// =============================================================================
// Pool and Schema
// =============================================================================

/// Connects to `PostgreSQL`, retrying while the server is not yet accepting
/// connections.
///
/// # Errors
///
/// Returns the last `RepositoryError::DatabaseError` once `attempts` are exhausted.
pub async fn connect_with_retry(
    database_url: &str,
    max_connections: u32,
    attempts: u32,
    delay: Duration,
) -> Result<PgPool, RepositoryError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await;

        match result {
            Ok(pool) => return Ok(pool),
            Err(error) if attempt < attempts => {
                tracing::warn!(
                    %error,
                    attempt,
                    max_attempts = attempts,
                    "PostgreSQL not reachable yet, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => return Err(RepositoryError::DatabaseError(error.to_string())),
        }
    }
}

/// Creates the `secrets` and `secret_logs` tables and indexes if missing.
///
/// # Errors
///
/// Returns `RepositoryError::DatabaseError` if any statement fails.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), RepositoryError> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|error| RepositoryError::DatabaseError(error.to_string()))?;
    }
    tracing::info!("Database schema is up to date");
    Ok(())
}

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SecretRow {
    secret_key: Uuid,
    ciphertext: String,
    passphrase_hash: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    accessed_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<SecretRow> for Secret {
    fn from(row: SecretRow) -> Self {
        Self {
            secret_key: SecretKey::from_uuid(row.secret_key),
            ciphertext: row.ciphertext,
            passphrase_hash: row.passphrase_hash,
            created_at: Timestamp::from_datetime(row.created_at),
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            accessed_at: row.accessed_at.map(Timestamp::from_datetime),
            deleted_at: row.deleted_at.map(Timestamp::from_datetime),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    secret_key: Uuid,
    action: String,
    ip_address: String,
    created_at: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = RepositoryError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = AuditAction::from_database_str(&row.action).ok_or_else(|| {
            RepositoryError::SerializationError(format!("unknown audit action '{}'", row.action))
        })?;
        Ok(Self {
            entry_id: AuditEntryId::from_uuid(row.id),
            secret_key: SecretKey::from_uuid(row.secret_key),
            action,
            ip_address: row.ip_address,
            occurred_at: Timestamp::from_datetime(row.created_at),
            metadata: row.metadata,
        })
    }
}

fn database_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::DatabaseError(error.to_string())
}

/// Maps unique violations to `Conflict`, everything else to `DatabaseError`.
fn insert_error(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database_error) if database_error.is_unique_violation() => {
            RepositoryError::Conflict(database_error.message().to_string())
        }
        _ => RepositoryError::DatabaseError(error.to_string()),
    }
}

// =============================================================================
// PostgreSQL Secret Repository
// =============================================================================

/// `PostgreSQL` implementation of `SecretRepository`.
///
/// # Example
///
/// ```ignore
/// let pool = PgPool::connect("postgres://localhost/secrets_db").await?;
/// ensure_schema(&pool).await?;
/// let repository = PostgresSecretRepository::new(pool);
/// repository.insert(&secret).await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresSecretRepository {
    pool: PgPool,
}

impl PostgresSecretRepository {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl SecretRepository for PostgresSecretRepository {
    fn insert(&self, secret: &Secret) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        let secret = secret.clone();

        Box::pin(async move {
            sqlx::query(
                "INSERT INTO secrets \
                 (secret_key, ciphertext, passphrase_hash, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(*secret.secret_key.as_uuid())
            .bind(secret.ciphertext)
            .bind(secret.passphrase_hash)
            .bind(*secret.created_at.as_datetime())
            .bind(secret.expires_at.map(|expires_at| *expires_at.as_datetime()))
            .execute(&pool)
            .await
            .map_err(insert_error)?;

            Ok(())
        })
    }

    fn find_by_key(&self, key: &SecretKey) -> RepositoryFuture<Option<Secret>> {
        let pool = self.pool.clone();
        let key = *key.as_uuid();

        Box::pin(async move {
            let sql = format!("SELECT {SECRET_COLUMNS} FROM secrets WHERE secret_key = $1");
            let row: Option<SecretRow> = sqlx::query_as(&sql)
                .bind(key)
                .fetch_optional(&pool)
                .await
                .map_err(database_error)?;

            Ok(row.map(Secret::from))
        })
    }

    fn claim(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<ClaimOutcome> {
        let pool = self.pool.clone();
        let key = *key.as_uuid();
        let now = *now.as_datetime();

        Box::pin(async move {
            // The CTE locks the row and keeps the pre-update ciphertext so the
            // UPDATE can scrub it while RETURNING still hands it to the caller.
            let claimed: Option<SecretRow> = sqlx::query_as(
                "WITH target AS ( \
                     SELECT secret_key, ciphertext, passphrase_hash, created_at, expires_at \
                     FROM secrets \
                     WHERE secret_key = $1 \
                       AND accessed_at IS NULL \
                       AND deleted_at IS NULL \
                       AND (expires_at IS NULL OR expires_at >= $2) \
                     FOR UPDATE \
                 ) \
                 UPDATE secrets SET accessed_at = $2, ciphertext = '' \
                 FROM target \
                 WHERE secrets.secret_key = target.secret_key \
                 RETURNING target.secret_key, target.ciphertext, target.passphrase_hash, \
                           target.created_at, target.expires_at, \
                           NULL::timestamptz AS accessed_at, NULL::timestamptz AS deleted_at",
            )
            .bind(key)
            .bind(now)
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            if let Some(row) = claimed {
                return Ok(ClaimOutcome::Claimed(Secret::from(row)));
            }

            let expired: Option<(bool,)> = sqlx::query_as(
                "SELECT TRUE FROM secrets \
                 WHERE secret_key = $1 \
                   AND accessed_at IS NULL \
                   AND deleted_at IS NULL \
                   AND expires_at < $2",
            )
            .bind(key)
            .bind(now)
            .fetch_optional(&pool)
            .await
            .map_err(database_error)?;

            Ok(if expired.is_some() {
                ClaimOutcome::Expired
            } else {
                ClaimOutcome::Unavailable
            })
        })
    }

    fn mark_deleted(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<bool> {
        let pool = self.pool.clone();
        let key = *key.as_uuid();
        let now = *now.as_datetime();

        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE secrets SET deleted_at = $2, ciphertext = '' \
                 WHERE secret_key = $1 AND deleted_at IS NULL",
            )
            .bind(key)
            .bind(now)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn purge_expired(&self, now: &Timestamp) -> RepositoryFuture<u64> {
        let pool = self.pool.clone();
        let now = *now.as_datetime();

        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE secrets SET ciphertext = '' \
                 WHERE accessed_at IS NULL \
                   AND deleted_at IS NULL \
                   AND expires_at < $1 \
                   AND ciphertext <> ''",
            )
            .bind(now)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(result.rows_affected())
        })
    }

    fn ping(&self) -> RepositoryFuture<()> {
        let pool = self.pool.clone();

        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&pool)
                .await
                .map_err(database_error)?;
            Ok(())
        })
    }
}

// =============================================================================
// PostgreSQL Audit Log
// =============================================================================

/// `PostgreSQL` implementation of `AuditLog`.
#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: PgPool,
}

impl PostgresAuditLog {
    /// Creates a new audit log with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditLog for PostgresAuditLog {
    fn append(&self, entry: &AuditEntry) -> RepositoryFuture<()> {
        let pool = self.pool.clone();
        let entry = entry.clone();

        Box::pin(async move {
            sqlx::query(
                "INSERT INTO secret_logs \
                 (id, secret_key, action, ip_address, created_at, metadata) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(*entry.entry_id.as_uuid())
            .bind(*entry.secret_key.as_uuid())
            .bind(entry.action.as_str())
            .bind(entry.ip_address)
            .bind(*entry.occurred_at.as_datetime())
            .bind(entry.metadata)
            .execute(&pool)
            .await
            .map_err(database_error)?;

            Ok(())
        })
    }

    fn list_for_secret(&self, key: &SecretKey) -> RepositoryFuture<Vec<AuditEntry>> {
        let pool = self.pool.clone();
        let key = *key.as_uuid();

        Box::pin(async move {
            let rows: Vec<AuditRow> = sqlx::query_as(
                "SELECT id, secret_key, action, ip_address, created_at, metadata \
                 FROM secret_logs WHERE secret_key = $1 \
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(key)
            .fetch_all(&pool)
            .await
            .map_err(database_error)?;

            rows.into_iter().map(AuditEntry::try_from).collect()
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
