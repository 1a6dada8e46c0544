//! Common test helpers for integration tests.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{create_test_app_state, send};
//! ```
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, so helpers used by only some
//! test files would otherwise generate dead code warnings.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use one_time_secrets::api::{AppConfig, AppState};
use one_time_secrets::domain::{Secret, SecretKey, Timestamp};
use one_time_secrets::infrastructure::{
    CacheConfig, CacheSource, CachedSecret, ClaimOutcome, InMemorySecretRepository,
    NoopSecretCache, Repositories, RepositoryError, RepositoryFuture, SecretCache, SecretCipher,
    SecretRepository,
};

// =============================================================================
// AppState Creation Helpers
// =============================================================================

/// Creates a test `AppState` with in-memory repositories and cache.
pub fn create_test_app_state() -> AppState {
    AppState::from_repositories(Repositories::in_memory(), SecretCipher::generate())
}

/// Creates a test `AppState` with caching disabled.
pub fn create_uncached_app_state() -> AppState {
    let mut repositories = Repositories::in_memory();
    repositories.secret_cache = Arc::new(NoopSecretCache);
    repositories.cache_source = CacheSource::None;

    let config = AppConfig {
        cache: CacheConfig::new(300, false),
        ..AppConfig::default()
    };
    AppState::with_config(repositories, SecretCipher::generate(), config)
}

/// Creates a test `AppState` whose Redis cache rejects every command.
pub fn create_failing_cache_app_state() -> AppState {
    let mut repositories = Repositories::in_memory();
    repositories.secret_cache = Arc::new(FailingSecretCache);
    repositories.cache_source = CacheSource::Redis;
    AppState::from_repositories(repositories, SecretCipher::generate())
}

/// Creates a test `AppState` whose storage answers queries but fails pings.
pub fn create_unreachable_storage_app_state() -> AppState {
    let mut repositories = Repositories::in_memory();
    repositories.secret_repository = Arc::new(UnreachableSecretRepository::default());
    AppState::from_repositories(repositories, SecretCipher::generate())
}

/// Stores a secret directly in the repository, bypassing the API.
pub async fn insert_secret(
    state: &AppState,
    plaintext: &str,
    created_at: Timestamp,
    expires_at: Option<Timestamp>,
) -> SecretKey {
    let secret_key = SecretKey::generate();
    let ciphertext = state.cipher.seal(&secret_key, plaintext).unwrap();
    let mut secret = Secret::new(secret_key, ciphertext, created_at);
    if let Some(expires_at) = expires_at {
        secret = secret.with_expires_at(expires_at);
    }
    state.secret_repository.insert(&secret).await.unwrap();
    secret_key
}

// =============================================================================
// Request Helpers
// =============================================================================

/// Response parts collected for assertions.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Sends a request through the router and collects the JSON body.
pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Builds a JSON `POST /secret` request.
pub fn create_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/secret")
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Builds a bodyless request.
pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.2")
        .body(Body::empty())
        .unwrap()
}

/// Creates a secret through the API and returns its key.
pub async fn create_secret(router: &Router, body: &Value) -> String {
    let response = send(router, create_request(body)).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response.body["secret_key"].as_str().unwrap().to_string()
}

// =============================================================================
// Failing Backends
// =============================================================================

/// Cache whose every operation fails, as with an unreachable Redis.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSecretCache;

fn cache_down<T>() -> RepositoryFuture<T>
where
    T: Send + 'static,
{
    Box::pin(async { Err(RepositoryError::CacheError("connection refused".to_string())) })
}

impl SecretCache for FailingSecretCache {
    fn put(&self, _key: &SecretKey, _entry: &CachedSecret, _ttl: u64) -> RepositoryFuture<()> {
        cache_down()
    }

    fn take(&self, _key: &SecretKey) -> RepositoryFuture<Option<CachedSecret>> {
        cache_down()
    }

    fn remove(&self, _key: &SecretKey) -> RepositoryFuture<bool> {
        cache_down()
    }

    fn ping(&self) -> RepositoryFuture<()> {
        cache_down()
    }
}

/// In-memory storage whose health check always fails.
#[derive(Debug, Clone, Default)]
pub struct UnreachableSecretRepository {
    inner: InMemorySecretRepository,
}

impl SecretRepository for UnreachableSecretRepository {
    fn insert(&self, secret: &Secret) -> RepositoryFuture<()> {
        self.inner.insert(secret)
    }

    fn find_by_key(&self, key: &SecretKey) -> RepositoryFuture<Option<Secret>> {
        self.inner.find_by_key(key)
    }

    fn claim(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<ClaimOutcome> {
        self.inner.claim(key, now)
    }

    fn mark_deleted(&self, key: &SecretKey, now: &Timestamp) -> RepositoryFuture<bool> {
        self.inner.mark_deleted(key, now)
    }

    fn purge_expired(&self, now: &Timestamp) -> RepositoryFuture<u64> {
        self.inner.purge_expired(now)
    }

    fn ping(&self) -> RepositoryFuture<()> {
        Box::pin(async { Err(RepositoryError::DatabaseError("connection refused".to_string())) })
    }
}
