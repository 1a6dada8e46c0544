//! Data Transfer Objects for API requests and responses.
//!
//! This module contains DTOs that are separate from domain models,
//! providing a clean API contract.

use serde::{Deserialize, Serialize};

use super::error::{FieldError, ValidationError};
use crate::domain::{AuditAction, AuditEntry, SecretKey, Timestamp};

// =============================================================================
// Limits
// =============================================================================

/// Largest accepted secret, in bytes.
pub const DEFAULT_MAX_SECRET_BYTES: usize = 64 * 1024;

/// Largest accepted passphrase, in bytes.
pub const MAX_PASSPHRASE_BYTES: usize = 256;

/// Longest accepted TTL (30 days).
pub const DEFAULT_MAX_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

// =============================================================================
// Secret DTOs
// =============================================================================

/// Request DTO for creating a secret.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSecretRequest {
    /// Plaintext to share.
    pub secret: String,
    /// Optional passphrase guarding deletion and the audit trail.
    #[serde(default)]
    pub passphrase: Option<String>,
    /// Optional lifetime in seconds.
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// Response DTO for a created secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSecretResponse {
    /// Key to read the secret with.
    pub secret_key: String,
    /// RFC 3339 expiry, if a TTL was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl CreateSecretResponse {
    #[must_use]
    pub fn new(secret_key: &SecretKey, expires_at: Option<&Timestamp>) -> Self {
        Self {
            secret_key: secret_key.to_string(),
            expires_at: expires_at.map(Timestamp::to_rfc3339),
        }
    }
}

/// Response DTO for a one-time read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretResponse {
    pub secret: String,
}

/// Response DTO for a deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteSecretResponse {
    pub status: String,
}

impl DeleteSecretResponse {
    #[must_use]
    pub fn deleted() -> Self {
        Self {
            status: "secret_deleted".to_string(),
        }
    }
}

/// Query parameters carrying an optional passphrase.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PassphraseQuery {
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// Response DTO for one audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntryResponse {
    /// Entry ID.
    pub id: String,
    /// Key of the secret the entry belongs to.
    pub secret_key: String,
    /// What happened.
    pub action: AuditAction,
    /// Client address of the request.
    pub ip_address: String,
    /// RFC 3339 time of the event.
    pub created_at: String,
    /// Action-specific details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl From<&AuditEntry> for AuditEntryResponse {
    fn from(entry: &AuditEntry) -> Self {
        Self {
            id: entry.entry_id.to_string(),
            secret_key: entry.secret_key.to_string(),
            action: entry.action,
            ip_address: entry.ip_address.clone(),
            created_at: entry.occurred_at.to_rfc3339(),
            metadata: entry.metadata.clone(),
        }
    }
}

// =============================================================================
// Validation Functions
// =============================================================================

/// Validated create request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCreateSecret {
    pub secret: String,
    pub passphrase: Option<String>,
    pub ttl_seconds: Option<u64>,
}

/// Validates the secret payload.
///
/// # Errors
///
/// Returns `ValidationError` if the secret is empty or larger than `max_bytes`.
pub fn validate_secret(secret: &str, max_bytes: usize) -> Result<String, ValidationError> {
    if secret.is_empty() {
        return Err(ValidationError::single("secret", "Secret is required"));
    }

    if secret.len() > max_bytes {
        return Err(ValidationError::single(
            "secret",
            format!("Secret must be at most {max_bytes} bytes"),
        ));
    }

    Ok(secret.to_string())
}

/// Validates an optional passphrase.
///
/// # Errors
///
/// Returns `ValidationError` if the passphrase is present but empty or too long.
pub fn validate_passphrase(passphrase: Option<&str>) -> Result<Option<String>, ValidationError> {
    match passphrase {
        None => Ok(None),
        Some("") => Err(ValidationError::single(
            "passphrase",
            "Passphrase must not be empty",
        )),
        Some(value) if value.len() > MAX_PASSPHRASE_BYTES => Err(ValidationError::single(
            "passphrase",
            format!("Passphrase must be at most {MAX_PASSPHRASE_BYTES} bytes"),
        )),
        Some(value) => Ok(Some(value.to_string())),
    }
}

/// Validates an optional TTL.
///
/// # Errors
///
/// Returns `ValidationError` if the TTL is below 1 or above `max_ttl_seconds`.
pub fn validate_ttl(
    ttl_seconds: Option<i64>,
    max_ttl_seconds: u64,
) -> Result<Option<u64>, ValidationError> {
    let Some(ttl) = ttl_seconds else {
        return Ok(None);
    };

    match u64::try_from(ttl) {
        Ok(ttl) if (1..=max_ttl_seconds).contains(&ttl) => Ok(Some(ttl)),
        _ => Err(ValidationError::single(
            "ttl_seconds",
            format!("TTL must be between 1 and {max_ttl_seconds} seconds"),
        )),
    }
}

/// Validates a create request, reporting every invalid field at once.
///
/// # Errors
///
/// Returns `ValidationError` with one `FieldError` per invalid field.
pub fn validate_create_request(
    request: &CreateSecretRequest,
    max_secret_bytes: usize,
    max_ttl_seconds: u64,
) -> Result<ValidatedCreateSecret, ValidationError> {
    let secret = validate_secret(&request.secret, max_secret_bytes);
    let passphrase = validate_passphrase(request.passphrase.as_deref());
    let ttl_seconds = validate_ttl(request.ttl_seconds, max_ttl_seconds);

    match (secret, passphrase, ttl_seconds) {
        (Ok(secret), Ok(passphrase), Ok(ttl_seconds)) => Ok(ValidatedCreateSecret {
            secret,
            passphrase,
            ttl_seconds,
        }),
        (secret, passphrase, ttl_seconds) => {
            let errors: Vec<FieldError> = [secret.err(), passphrase.err(), ttl_seconds.err()]
                .into_iter()
                .flatten()
                .flat_map(|error| error.errors)
                .collect();
            Err(ValidationError::new(errors))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request(secret: &str, passphrase: Option<&str>, ttl_seconds: Option<i64>) -> CreateSecretRequest {
        CreateSecretRequest {
            secret: secret.to_string(),
            passphrase: passphrase.map(ToString::to_string),
            ttl_seconds,
        }
    }

    // -------------------------------------------------------------------------
    // Secret Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_validate_secret_valid() {
        assert_eq!(validate_secret("hunter2", 16).unwrap(), "hunter2");
    }

    #[rstest]
    fn test_validate_secret_empty() {
        let error = validate_secret("", 16).unwrap_err();
        assert_eq!(error.errors[0].field, "secret");
    }

    #[rstest]
    #[case(16, true)]
    #[case(15, false)]
    fn test_validate_secret_size_boundary(#[case] max_bytes: usize, #[case] accepted: bool) {
        assert_eq!(validate_secret(&"x".repeat(16), max_bytes).is_ok(), accepted);
    }

    #[rstest]
    fn test_validate_secret_counts_bytes_not_chars() {
        // Four characters, twelve bytes.
        assert!(validate_secret("鍵鍵鍵鍵", 8).is_err());
    }

    // -------------------------------------------------------------------------
    // Passphrase Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case(None, true)]
    #[case(Some("correct horse"), true)]
    #[case(Some(""), false)]
    fn test_validate_passphrase(#[case] passphrase: Option<&str>, #[case] accepted: bool) {
        assert_eq!(validate_passphrase(passphrase).is_ok(), accepted);
    }

    #[rstest]
    fn test_validate_passphrase_too_long() {
        let long = "p".repeat(MAX_PASSPHRASE_BYTES + 1);
        assert!(validate_passphrase(Some(&long)).is_err());
        let exact = "p".repeat(MAX_PASSPHRASE_BYTES);
        assert!(validate_passphrase(Some(&exact)).is_ok());
    }

    // -------------------------------------------------------------------------
    // TTL Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[case(None, Ok(None))]
    #[case(Some(1), Ok(Some(1)))]
    #[case(Some(3600), Ok(Some(3600)))]
    #[case(Some(2_592_000), Ok(Some(2_592_000)))]
    #[case(Some(0), Err(()))]
    #[case(Some(-5), Err(()))]
    #[case(Some(2_592_001), Err(()))]
    fn test_validate_ttl(#[case] ttl: Option<i64>, #[case] expected: Result<Option<u64>, ()>) {
        let result = validate_ttl(ttl, DEFAULT_MAX_TTL_SECONDS).map_err(|_| ());
        assert_eq!(result, expected);
    }

    // -------------------------------------------------------------------------
    // Request Validation Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_validate_create_request_valid() {
        let validated = validate_create_request(
            &request("hunter2", Some("open sesame"), Some(60)),
            DEFAULT_MAX_SECRET_BYTES,
            DEFAULT_MAX_TTL_SECONDS,
        )
        .unwrap();

        assert_eq!(validated.secret, "hunter2");
        assert_eq!(validated.passphrase.as_deref(), Some("open sesame"));
        assert_eq!(validated.ttl_seconds, Some(60));
    }

    #[rstest]
    fn test_validate_create_request_collects_all_errors() {
        let error = validate_create_request(
            &request("", Some(""), Some(0)),
            DEFAULT_MAX_SECRET_BYTES,
            DEFAULT_MAX_TTL_SECONDS,
        )
        .unwrap_err();

        let fields: Vec<&str> = error.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["secret", "passphrase", "ttl_seconds"]);
    }

    // -------------------------------------------------------------------------
    // Response Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_create_response_omits_missing_expiry() {
        let key = SecretKey::generate();
        let json = serde_json::to_value(CreateSecretResponse::new(&key, None)).unwrap();
        assert_eq!(json, serde_json::json!({ "secret_key": key.to_string() }));
    }

    #[rstest]
    fn test_audit_entry_response_from_entry() {
        let key = SecretKey::generate();
        let entry = AuditEntry::read(key, "203.0.113.7", Timestamp::now(), "miss");
        let response = AuditEntryResponse::from(&entry);

        assert_eq!(response.secret_key, key.to_string());
        assert_eq!(response.action, AuditAction::Read);
        assert_eq!(response.ip_address, "203.0.113.7");
        assert_eq!(response.metadata, Some(serde_json::json!({ "cache": "miss" })));
    }

    #[rstest]
    fn test_delete_response() {
        let json = serde_json::to_value(DeleteSecretResponse::deleted()).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "secret_deleted" }));
    }
}
