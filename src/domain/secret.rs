//! Secret domain model.
//!
//! A secret is stored sealed (see `infrastructure::crypto`) and may be
//! read at most once. Reading or deleting a secret scrubs its ciphertext.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Opaque key handed to the client when a secret is created.
///
/// This is a newtype wrapper around a random (v4) UUID so that keys cannot be
/// guessed from creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SecretKey(Uuid);

impl SecretKey {
    /// Creates a `SecretKey` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Short, non-reversible form for logs and error messages.
    ///
    /// The full key is the only credential needed to read a secret, so it
    /// must never reach a log line.
    #[must_use]
    pub fn redacted(&self) -> String {
        let simple = self.0.simple().to_string();
        format!("{}...", simple.chars().take(8).collect::<String>())
    }

    /// Generates a new random `SecretKey`.
    ///
    /// **Note**: This is an impure function (side effect: random number generation).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SecretKey {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.hyphenated())
    }
}

impl FromStr for SecretKey {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This is an impure function (side effect: system clock).
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns this timestamp shifted forward by `seconds`.
    ///
    /// Saturates at the maximum representable time.
    #[must_use]
    pub fn plus_seconds(&self, seconds: u64) -> Self {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        Duration::try_seconds(seconds)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map_or(Self(DateTime::<Utc>::MAX_UTC), Self)
    }

    /// Formats the timestamp as RFC 3339 for API responses.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// =============================================================================
// Availability
// =============================================================================

/// Whether a stored secret can still be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// The secret has not been read, deleted, or expired.
    Available,
    /// The secret's TTL has elapsed.
    Expired,
    /// The secret has already been read once.
    Consumed,
    /// The secret was deleted by its owner.
    Deleted,
}

// =============================================================================
// Secret Entity
// =============================================================================

/// A stored one-time secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Key the secret is addressed by.
    pub secret_key: SecretKey,
    /// Sealed payload. Empty once the secret is no longer available.
    pub ciphertext: String,
    /// Argon2 PHC string guarding deletion and audit access.
    pub passphrase_hash: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time after which the secret can no longer be read.
    pub expires_at: Option<Timestamp>,
    /// Time of the one permitted read.
    pub accessed_at: Option<Timestamp>,
    /// Time of deletion.
    pub deleted_at: Option<Timestamp>,
}

impl Secret {
    /// Creates a new, unread, non-expiring secret.
    #[must_use]
    pub fn new(secret_key: SecretKey, ciphertext: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            secret_key,
            ciphertext: ciphertext.into(),
            passphrase_hash: None,
            created_at,
            expires_at: None,
            accessed_at: None,
            deleted_at: None,
        }
    }

    /// Returns a copy protected by the given passphrase hash.
    #[must_use]
    pub fn with_passphrase_hash(self, passphrase_hash: impl Into<String>) -> Self {
        Self {
            passphrase_hash: Some(passphrase_hash.into()),
            ..self
        }
    }

    /// Returns a copy that expires at the given time.
    #[must_use]
    pub fn with_expires_at(self, expires_at: Timestamp) -> Self {
        Self {
            expires_at: Some(expires_at),
            ..self
        }
    }

    /// Returns `true` if the secret has a TTL that elapsed before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: &Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < *now)
    }

    /// Returns `true` once the secret has been read.
    #[must_use]
    pub const fn is_accessed(&self) -> bool {
        self.accessed_at.is_some()
    }

    /// Returns `true` once the secret has been deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns `true` if deletion and audit access require a passphrase.
    #[must_use]
    pub const fn requires_passphrase(&self) -> bool {
        self.passphrase_hash.is_some()
    }

    /// Classifies the secret at the given instant.
    ///
    /// Deletion takes precedence over consumption, which takes precedence
    /// over expiry.
    #[must_use]
    pub fn availability_at(&self, now: &Timestamp) -> Availability {
        if self.is_deleted() {
            Availability::Deleted
        } else if self.is_accessed() {
            Availability::Consumed
        } else if self.is_expired_at(now) {
            Availability::Expired
        } else {
            Availability::Available
        }
    }

    /// Returns the consumed form of this secret, with the payload scrubbed.
    #[must_use]
    pub fn mark_accessed(self, now: Timestamp) -> Self {
        Self {
            ciphertext: String::new(),
            accessed_at: Some(now),
            ..self
        }
    }

    /// Returns this secret with the payload scrubbed and its lifecycle state
    /// untouched. Used when an expired secret is purged.
    #[must_use]
    pub fn scrubbed(self) -> Self {
        Self {
            ciphertext: String::new(),
            ..self
        }
    }

    /// Returns the deleted form of this secret, with the payload scrubbed.
    #[must_use]
    pub fn mark_deleted(self, now: Timestamp) -> Self {
        Self {
            ciphertext: String::new(),
            deleted_at: Some(now),
            ..self
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
