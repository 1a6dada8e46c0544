//! Audit trail for secret lifecycle events.
//!
//! Every create, read and delete is recorded with the client address.
//! Entries are append-only.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::secret::{SecretKey, Timestamp};

/// Unique identifier for an audit entry.
///
/// Uses time-ordered UUIDs (v7) so that entries sort by insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditEntryId(Uuid);

impl AuditEntryId {
    /// Creates an `AuditEntryId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generates a new time-ordered `AuditEntryId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl std::fmt::Display for AuditEntryId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// The lifecycle event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Delete,
}

impl AuditAction {
    /// Database and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Delete => "delete",
        }
    }

    /// Parses the database representation.
    #[must_use]
    pub fn from_database_str(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// One recorded lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: AuditEntryId,
    pub secret_key: SecretKey,
    pub action: AuditAction,
    pub ip_address: String,
    pub occurred_at: Timestamp,
    /// Action-specific details. Never contains secret material.
    pub metadata: Option<serde_json::Value>,
}

impl AuditEntry {
    /// Creates a new entry with a freshly generated id.
    #[must_use]
    pub fn new(
        secret_key: SecretKey,
        action: AuditAction,
        ip_address: impl Into<String>,
        occurred_at: Timestamp,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entry_id: AuditEntryId::generate(),
            secret_key,
            action,
            ip_address: ip_address.into(),
            occurred_at,
            metadata,
        }
    }

    /// Records the creation of a secret.
    #[must_use]
    pub fn created(
        secret_key: SecretKey,
        ip_address: impl Into<String>,
        occurred_at: Timestamp,
        ttl_seconds: Option<u64>,
        has_passphrase: bool,
    ) -> Self {
        Self::new(
            secret_key,
            AuditAction::Create,
            ip_address,
            occurred_at,
            Some(json!({
                "ttl_seconds": ttl_seconds,
                "has_passphrase": has_passphrase,
            })),
        )
    }

    /// Records the one-time read of a secret.
    ///
    /// `cache_status` is the `X-Cache-Status` value the read was served with.
    #[must_use]
    pub fn read(
        secret_key: SecretKey,
        ip_address: impl Into<String>,
        occurred_at: Timestamp,
        cache_status: &str,
    ) -> Self {
        Self::new(
            secret_key,
            AuditAction::Read,
            ip_address,
            occurred_at,
            Some(json!({ "cache": cache_status })),
        )
    }

    /// Records the deletion of a secret.
    #[must_use]
    pub fn deleted(
        secret_key: SecretKey,
        ip_address: impl Into<String>,
        occurred_at: Timestamp,
        used_passphrase: bool,
    ) -> Self {
        Self::new(
            secret_key,
            AuditAction::Delete,
            ip_address,
            occurred_at,
            Some(json!({ "used_passphrase": used_passphrase })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(AuditAction::Create, "create")]
    #[case(AuditAction::Read, "read")]
    #[case(AuditAction::Delete, "delete")]
    fn test_action_database_representation(#[case] action: AuditAction, #[case] text: &str) {
        assert_eq!(action.as_str(), text);
        assert_eq!(AuditAction::from_database_str(text), Some(action));
    }

    #[rstest]
    fn test_action_unknown() {
        assert_eq!(AuditAction::from_database_str("update"), None);
    }

    #[rstest]
    fn test_action_serializes_snake_case() {
        let json = serde_json::to_string(&AuditAction::Delete).unwrap();
        assert_eq!(json, "\"delete\"");
    }

    #[rstest]
    fn test_created_metadata() {
        let entry = AuditEntry::created(
            SecretKey::generate(),
            "10.0.0.1",
            Timestamp::now(),
            Some(60),
            true,
        );
        assert_eq!(entry.action, AuditAction::Create);
        let metadata = entry.metadata.unwrap();
        assert_eq!(metadata["ttl_seconds"], 60);
        assert_eq!(metadata["has_passphrase"], true);
    }

    #[rstest]
    fn test_created_without_ttl() {
        let entry =
            AuditEntry::created(SecretKey::generate(), "::1", Timestamp::now(), None, false);
        assert!(entry.metadata.unwrap()["ttl_seconds"].is_null());
    }

    #[rstest]
    fn test_deleted_metadata() {
        let entry = AuditEntry::deleted(SecretKey::generate(), "::1", Timestamp::now(), false);
        assert_eq!(entry.action, AuditAction::Delete);
        assert_eq!(entry.metadata.unwrap()["used_passphrase"], false);
    }

    #[rstest]
    fn test_entry_ids_are_time_ordered() {
        let first = AuditEntryId::generate();
        let second = AuditEntryId::generate();
        assert!(first < second);
    }
}
