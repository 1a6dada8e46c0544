//! Secret endpoints: create, one-time read, delete, and audit trail.
//!
//! Every read claims the durable record, even when the payload is served
//! from the cache, so a secret can never be read twice. Cache and audit
//! failures are logged and do not fail the request.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use super::cache_header::{CacheHeaderExtension, build_cache_headers};
use super::client::ClientAddress;
use super::dto::{
    AuditEntryResponse, CreateSecretRequest, CreateSecretResponse, DeleteSecretResponse,
    PassphraseQuery, SecretResponse, validate_create_request,
};
use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::{AuditEntry, Secret, SecretKey, Timestamp};
use crate::infrastructure::{
    CacheSource, CacheStatus, CachedSecret, ClaimOutcome, hash_passphrase, verify_passphrase,
};

const NOT_FOUND_OR_ACCESSED: &str = "Secret not found or already accessed";
const NOT_FOUND_OR_DELETED: &str = "Secret not found or already deleted";
const NOT_FOUND: &str = "Secret not found";
const EXPIRED: &str = "Secret has expired";

// =============================================================================
// POST /secret Handler
// =============================================================================

/// Creates a secret.
///
/// # Request Body
///
/// ```json
/// {
///   "secret": "hunter2",
///   "passphrase": "optional passphrase",
///   "ttl_seconds": 3600
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: `{"secret_key": "...", "expires_at": "..."}`
/// - **400 Bad Request**: Malformed body or validation error
/// - **500 Internal Server Error**: Storage or encryption failure
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the cases listed above.
pub async fn create_secret(
    State(state): State<AppState>,
    client: ClientAddress,
    payload: Result<Json<CreateSecretRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateSecretResponse>), ApiErrorResponse> {
    let Json(request) = payload
        .map_err(|rejection| ApiErrorResponse::bad_request("INVALID_JSON", rejection.body_text()))?;

    let validated = validate_create_request(
        &request,
        state.config.max_secret_bytes,
        state.config.max_ttl_seconds,
    )?;

    let secret_key = SecretKey::generate();
    let now = Timestamp::now();
    let ciphertext = state.cipher.seal(&secret_key, &validated.secret)?;

    let passphrase_hash = match validated.passphrase {
        Some(passphrase) => Some(run_blocking(move || hash_passphrase(&passphrase)).await??),
        None => None,
    };
    let has_passphrase = passphrase_hash.is_some();

    let secret = build_secret(
        secret_key,
        ciphertext,
        now,
        passphrase_hash,
        validated.ttl_seconds,
    );

    state.secret_repository.insert(&secret).await?;

    if state.caching_enabled() {
        let ttl = state.config.cache.effective_ttl(validated.ttl_seconds);
        if let Err(error) = state
            .secret_cache
            .put(&secret_key, &CachedSecret::from_secret(&secret), ttl)
            .await
        {
            tracing::warn!(
                %error,
                secret_key = %secret_key.redacted(),
                "Failed to cache secret"
            );
        }
    }

    record_audit(
        &state,
        AuditEntry::created(
            secret_key,
            client.into_string(),
            now,
            validated.ttl_seconds,
            has_passphrase,
        ),
    )
    .await;

    tracing::info!(
        secret_key = %secret_key.redacted(),
        has_passphrase,
        ttl_seconds = ?validated.ttl_seconds,
        "Secret created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSecretResponse::new(&secret_key, secret.expires_at.as_ref())),
    ))
}

/// Assembles a new secret from validated parts.
fn build_secret(
    secret_key: SecretKey,
    ciphertext: String,
    now: Timestamp,
    passphrase_hash: Option<String>,
    ttl_seconds: Option<u64>,
) -> Secret {
    let mut secret = Secret::new(secret_key, ciphertext, now);

    if let Some(hash) = passphrase_hash {
        secret = secret.with_passphrase_hash(hash);
    }

    if let Some(ttl) = ttl_seconds {
        secret = secret.with_expires_at(now.plus_seconds(ttl));
    }

    secret
}

// =============================================================================
// GET /secret/{secret_key} Handler
// =============================================================================

/// Reads a secret exactly once.
///
/// # Response
///
/// - **200 OK**: `{"secret": "..."}` with `X-Cache` and `X-Cache-Status` headers
/// - **404 Not Found**: unknown, expired, already read, or deleted
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the cases listed above, or 500 when
/// storage or decryption fails.
pub async fn read_secret(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    client: ClientAddress,
) -> Result<(HeaderMap, Json<SecretResponse>), ApiErrorResponse> {
    let secret_key = parse_key(&raw_key, NOT_FOUND_OR_ACCESSED)?;

    let (cache_status, cached) = take_from_cache(&state, &secret_key).await;

    let now = Timestamp::now();
    let claimed = match state.secret_repository.claim(&secret_key, &now).await? {
        ClaimOutcome::Claimed(secret) => secret,
        ClaimOutcome::Expired => return Err(ApiErrorResponse::not_found(EXPIRED)),
        ClaimOutcome::Unavailable => return Err(ApiErrorResponse::not_found(NOT_FOUND_OR_ACCESSED)),
    };

    let ciphertext = cached.map_or(claimed.ciphertext, |entry| entry.ciphertext);
    let plaintext = state.cipher.open(&secret_key, &ciphertext)?;

    record_audit(
        &state,
        AuditEntry::read(secret_key, client.into_string(), now, cache_status.as_str()),
    )
    .await;

    tracing::info!(
        secret_key = %secret_key.redacted(),
        cache = cache_status.as_str(),
        "Secret read"
    );

    let extension = if cache_status == CacheStatus::Bypass {
        CacheHeaderExtension::bypass()
    } else {
        CacheHeaderExtension::new(cache_status, state.cache_source)
    };
    let headers = build_cache_headers(extension);

    Ok((headers, Json(SecretResponse { secret: plaintext })))
}

/// Takes the payload out of the cache. Cache failures degrade to a miss, and
/// an entry that outlived its secret's TTL is discarded.
async fn take_from_cache(
    state: &AppState,
    secret_key: &SecretKey,
) -> (CacheStatus, Option<CachedSecret>) {
    if state.cache_source == CacheSource::None {
        return (CacheStatus::Bypass, None);
    }

    match state.secret_cache.take(secret_key).await {
        Ok(Some(entry)) if entry.is_expired_at(&Timestamp::now()) => (CacheStatus::Miss, None),
        Ok(Some(entry)) => (CacheStatus::Hit, Some(entry)),
        Ok(None) => (CacheStatus::Miss, None),
        Err(error) => {
            tracing::warn!(
                %error,
                secret_key = %secret_key.redacted(),
                "Cache read failed, falling back to storage"
            );
            (CacheStatus::Error, None)
        }
    }
}

// =============================================================================
// DELETE /secret/{secret_key} Handler
// =============================================================================

/// Deletes a secret, read or not.
///
/// # Response
///
/// - **200 OK**: `{"status": "secret_deleted"}`
/// - **403 Forbidden**: passphrase missing or wrong
/// - **404 Not Found**: unknown or already deleted
///
/// # Errors
///
/// Returns [`ApiErrorResponse`] for the cases listed above.
pub async fn delete_secret(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    Query(query): Query<PassphraseQuery>,
    client: ClientAddress,
) -> Result<Json<DeleteSecretResponse>, ApiErrorResponse> {
    let secret_key = parse_key(&raw_key, NOT_FOUND_OR_DELETED)?;

    if let Err(error) = state.secret_cache.remove(&secret_key).await {
        tracing::warn!(
            %error,
            secret_key = %secret_key.redacted(),
            "Failed to evict secret from cache"
        );
    }

    let secret = state
        .secret_repository
        .find_by_key(&secret_key)
        .await?
        .filter(|secret| !secret.is_deleted())
        .ok_or_else(|| ApiErrorResponse::not_found(NOT_FOUND_OR_DELETED))?;

    let used_passphrase = authorize(&secret, query.passphrase).await?;

    let now = Timestamp::now();
    if !state.secret_repository.mark_deleted(&secret_key, &now).await? {
        return Err(ApiErrorResponse::not_found(NOT_FOUND_OR_DELETED));
    }

    record_audit(
        &state,
        AuditEntry::deleted(secret_key, client.into_string(), now, used_passphrase),
    )
    .await;

    tracing::info!(secret_key = %secret_key.redacted(), "Secret deleted");

    Ok(Json(DeleteSecretResponse::deleted()))
}

// =============================================================================
// GET /secret/{secret_key}/logs Handler
// =============================================================================

/// Lists the audit trail of a secret, oldest first.
///
/// # Errors
///
/// Returns 404 for an unknown key and 403 when the passphrase is missing or wrong.
pub async fn list_secret_logs(
    State(state): State<AppState>,
    Path(raw_key): Path<String>,
    Query(query): Query<PassphraseQuery>,
) -> Result<Json<Vec<AuditEntryResponse>>, ApiErrorResponse> {
    let secret_key = parse_key(&raw_key, NOT_FOUND)?;

    let secret = state
        .secret_repository
        .find_by_key(&secret_key)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(NOT_FOUND))?;

    authorize(&secret, query.passphrase).await?;

    let entries = state.audit_log.list_for_secret(&secret_key).await?;

    Ok(Json(entries.iter().map(AuditEntryResponse::from).collect()))
}

// =============================================================================
// Helpers
// =============================================================================

/// Parses a path key. Unparsable keys are reported as not found.
fn parse_key(raw_key: &str, not_found_message: &str) -> Result<SecretKey, ApiErrorResponse> {
    raw_key
        .parse()
        .map_err(|_| ApiErrorResponse::not_found(not_found_message))
}

/// Checks the supplied passphrase against the secret.
///
/// Returns `Ok(true)` if a passphrase was required and matched, `Ok(false)`
/// if none was required.
async fn authorize(secret: &Secret, candidate: Option<String>) -> Result<bool, ApiErrorResponse> {
    let Some(hash) = secret.passphrase_hash.clone() else {
        return Ok(false);
    };
    let candidate = candidate.ok_or_else(ApiErrorResponse::invalid_passphrase)?;

    if run_blocking(move || verify_passphrase(&candidate, &hash)).await?? {
        Ok(true)
    } else {
        Err(ApiErrorResponse::invalid_passphrase())
    }
}

/// Runs CPU-heavy work (password hashing) off the async worker threads.
async fn run_blocking<F, T>(work: F) -> Result<T, ApiErrorResponse>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|error| {
        tracing::error!(%error, "Blocking task failed");
        ApiErrorResponse::internal_error("An internal error occurred")
    })
}

/// Appends an audit entry. Failures are logged and swallowed.
async fn record_audit(state: &AppState, entry: AuditEntry) {
    if let Err(error) = state.audit_log.append(&entry).await {
        tracing::warn!(
            %error,
            secret_key = %entry.secret_key.redacted(),
            action = entry.action.as_str(),
            "Failed to write audit entry"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use rstest::rstest;

    fn protected_secret(passphrase: &str) -> Secret {
        Secret::new(SecretKey::generate(), "sealed", Timestamp::now())
            .with_passphrase_hash(hash_passphrase(passphrase).unwrap())
    }

    #[rstest]
    fn test_parse_key_invalid_is_not_found() {
        let error = parse_key("not-a-uuid", NOT_FOUND_OR_ACCESSED).unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.error.message, NOT_FOUND_OR_ACCESSED);
    }

    #[rstest]
    fn test_build_secret_with_ttl_and_passphrase() {
        let now = Timestamp::now();
        let secret = build_secret(
            SecretKey::generate(),
            "sealed".to_string(),
            now,
            Some("hash".to_string()),
            Some(60),
        );
        assert!(secret.requires_passphrase());
        assert_eq!(secret.expires_at, Some(now.plus_seconds(60)));
    }

    #[rstest]
    fn test_build_secret_without_options() {
        let secret = build_secret(
            SecretKey::generate(),
            "sealed".to_string(),
            Timestamp::now(),
            None,
            None,
        );
        assert!(!secret.requires_passphrase());
        assert!(secret.expires_at.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_authorize_unprotected() {
        let secret = Secret::new(SecretKey::generate(), "sealed", Timestamp::now());
        assert!(!authorize(&secret, None).await.unwrap());
    }

    #[rstest]
    #[tokio::test]
    async fn test_authorize_correct_passphrase() {
        let secret = protected_secret("open sesame");
        assert!(authorize(&secret, Some("open sesame".to_string())).await.unwrap());
    }

    #[rstest]
    #[case(None)]
    #[case(Some("wrong"))]
    #[tokio::test]
    async fn test_authorize_rejects(#[case] candidate: Option<&str>) {
        let secret = protected_secret("open sesame");
        let error = authorize(&secret, candidate.map(ToString::to_string))
            .await
            .unwrap_err();
        assert_eq!(error.status, StatusCode::FORBIDDEN);
        assert_eq!(error.error.code, "INVALID_PASSPHRASE");
    }
}
