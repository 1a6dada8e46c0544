//! Application state, configuration, and service-level handlers.
//!
//! The secret endpoints live in [`super::secrets`]; this module wires them
//! into a router together with the health check and the service index.

use std::env;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use super::cache_header::NoStoreLayer;
use super::dto::{DEFAULT_MAX_SECRET_BYTES, DEFAULT_MAX_TTL_SECONDS};
use super::secrets::{create_secret, delete_secret, list_secret_logs, read_secret};
use crate::infrastructure::factory::{EnvLookup, parse_or_default};
use crate::infrastructure::{
    AuditLog, CacheConfig, CacheSource, ConfigurationError, Repositories, SecretCache,
    SecretCipher, SecretRepository,
};

/// Default interval between purges of expired secrets.
pub const DEFAULT_PURGE_INTERVAL_SECONDS: u64 = 60;

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration for runtime settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Largest accepted secret, in bytes.
    pub max_secret_bytes: usize,
    /// Longest accepted TTL in seconds.
    pub max_ttl_seconds: u64,
    /// Cache behavior for new secrets.
    pub cache: CacheConfig,
    /// Seconds between purges of expired secrets; 0 disables purging.
    pub purge_interval_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_secret_bytes: DEFAULT_MAX_SECRET_BYTES,
            max_ttl_seconds: DEFAULT_MAX_TTL_SECONDS,
            cache: CacheConfig::default(),
            purge_interval_seconds: DEFAULT_PURGE_INTERVAL_SECONDS,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    ///
    /// - `MAX_SECRET_BYTES` (default 65536)
    /// - `MAX_TTL_SECONDS` (default 2592000)
    /// - `CACHE_TTL_SECONDS`, `CACHE_ENABLED`
    /// - `PURGE_INTERVAL_SECONDS` (default 60)
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::InvalidValue` for unparsable values.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    /// Loads the configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: EnvLookup<'_>) -> Result<Self, ConfigurationError> {
        Ok(Self {
            max_secret_bytes: parse_or_default(
                lookup,
                "MAX_SECRET_BYTES",
                DEFAULT_MAX_SECRET_BYTES,
            )?,
            max_ttl_seconds: parse_or_default(lookup, "MAX_TTL_SECONDS", DEFAULT_MAX_TTL_SECONDS)?,
            cache: CacheConfig::from_lookup(lookup)?,
            purge_interval_seconds: parse_or_default(
                lookup,
                "PURGE_INTERVAL_SECONDS",
                DEFAULT_PURGE_INTERVAL_SECONDS,
            )?,
        })
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Uses trait objects (`dyn`) so that backends chosen at runtime by
/// `RepositoryFactory` can be swapped without changing handler signatures.
#[derive(Clone)]
pub struct AppState {
    /// Durable secret storage.
    pub secret_repository: Arc<dyn SecretRepository>,
    /// Audit trail.
    pub audit_log: Arc<dyn AuditLog>,
    /// Cache for sealed payloads.
    pub secret_cache: Arc<dyn SecretCache>,
    /// Which cache backend is in use.
    pub cache_source: CacheSource,
    /// Payload cipher.
    pub cipher: Arc<SecretCipher>,
    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Creates a new `AppState` with the default configuration.
    #[must_use]
    pub fn from_repositories(repositories: Repositories, cipher: SecretCipher) -> Self {
        Self::with_config(repositories, cipher, AppConfig::default())
    }

    /// Creates a new `AppState` from repositories and custom configuration.
    #[must_use]
    pub fn with_config(repositories: Repositories, cipher: SecretCipher, config: AppConfig) -> Self {
        Self {
            secret_repository: repositories.secret_repository,
            audit_log: repositories.audit_log,
            secret_cache: repositories.secret_cache,
            cache_source: repositories.cache_source,
            cipher: Arc::new(cipher),
            config,
        }
    }

    /// Whether new secrets are written to the cache.
    #[must_use]
    pub fn caching_enabled(&self) -> bool {
        self.config.cache.enabled && self.cache_source != CacheSource::None
    }
}

// =============================================================================
// Router
// =============================================================================

/// Builds the application router with every route and the no-store policy.
///
/// CORS is left to the binary.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_index))
        .route("/health", get(health_check))
        .route("/secret", post(create_secret))
        .route("/secret/{secret_key}", get(read_secret).delete(delete_secret))
        .route("/secret/{secret_key}/logs", get(list_secret_logs))
        .layer(NoStoreLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span carrying the route template instead of the URI, which would
/// contain the secret key.
fn request_span(request: &Request<Body>) -> tracing::Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("unmatched", MatchedPath::as_str);
    tracing::debug_span!("request", method = %request.method(), route)
}

// =============================================================================
// GET / Handler
// =============================================================================

/// Service index response body.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceIndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Describes the service and its endpoints.
pub async fn service_index() -> Json<ServiceIndexResponse> {
    Json(ServiceIndexResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        description: "Share a secret that can be read exactly once",
        endpoints: vec![
            "GET /health",
            "POST /secret",
            "GET /secret/{secret_key}",
            "DELETE /secret/{secret_key}?passphrase=",
            "GET /secret/{secret_key}/logs?passphrase=",
        ],
    })
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Status of a single dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// `ok`, `unavailable`, or `disabled`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
}

/// Per-dependency health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthComponents {
    pub storage: ComponentHealth,
    pub cache: ComponentHealth,
}

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when storage is unreachable.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    pub components: HealthComponents,
}

/// Health check endpoint.
///
/// # Response
///
/// - **200 OK**: storage is reachable (a cache failure is reported but
///   does not fail the check)
/// - **503 Service Unavailable**: storage is unreachable
///
/// ```json
/// {
///   "status": "ok",
///   "version": "0.1.0",
///   "components": {
///     "storage": { "status": "ok" },
///     "cache": { "status": "ok", "backend": "redis" }
///   }
/// }
/// ```
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (storage_result, cache_result) = tokio::join!(
        state.secret_repository.ping(),
        state.secret_cache.ping()
    );

    let storage_ok = match storage_result {
        Ok(()) => true,
        Err(error) => {
            tracing::error!(%error, "Storage health check failed");
            false
        }
    };

    let cache_status = match (state.cache_source, cache_result) {
        (CacheSource::None, _) => "disabled",
        (_, Ok(())) => "ok",
        (_, Err(error)) => {
            tracing::warn!(%error, "Cache health check failed");
            "unavailable"
        }
    };

    let (status_code, status) = if storage_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            components: HealthComponents {
                storage: ComponentHealth {
                    status: if storage_ok { "ok" } else { "unavailable" },
                    backend: None,
                },
                cache: ComponentHealth {
                    status: cache_status,
                    backend: Some(state.cache_source.as_str()),
                },
            },
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn state_with_cache(source: CacheSource, enabled: bool) -> AppState {
        let mut repositories = Repositories::in_memory();
        repositories.cache_source = source;
        let config = AppConfig {
            cache: CacheConfig::new(300, enabled),
            ..AppConfig::default()
        };
        AppState::with_config(repositories, SecretCipher::generate(), config)
    }

    #[rstest]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.max_secret_bytes, 64 * 1024);
        assert_eq!(config.max_ttl_seconds, 2_592_000);
        assert_eq!(config.purge_interval_seconds, 60);
    }

    #[rstest]
    fn test_app_config_from_lookup() {
        let lookup = |name: &str| match name {
            "MAX_SECRET_BYTES" => Some("1024".to_string()),
            "PURGE_INTERVAL_SECONDS" => Some("0".to_string()),
            "CACHE_TTL_SECONDS" => Some("30".to_string()),
            _ => None,
        };
        let config = AppConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.max_secret_bytes, 1024);
        assert_eq!(config.purge_interval_seconds, 0);
        assert_eq!(config.cache.ttl_seconds, 30);
        assert_eq!(config.max_ttl_seconds, DEFAULT_MAX_TTL_SECONDS);
    }

    #[rstest]
    fn test_app_config_from_lookup_invalid() {
        let lookup = |name: &str| (name == "MAX_TTL_SECONDS").then(|| "forever".to_string());
        assert!(AppConfig::from_lookup(&lookup).is_err());
    }

    #[rstest]
    #[case(CacheSource::Memory, true, true)]
    #[case(CacheSource::Redis, true, true)]
    #[case(CacheSource::Redis, false, false)]
    #[case(CacheSource::None, true, false)]
    fn test_caching_enabled(
        #[case] source: CacheSource,
        #[case] enabled: bool,
        #[case] expected: bool,
    ) {
        assert_eq!(state_with_cache(source, enabled).caching_enabled(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn test_health_check_in_memory() {
        let (status, Json(body)) =
            health_check(State(state_with_cache(CacheSource::Memory, true))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.components.cache.backend, Some("memory"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_health_check_cache_disabled() {
        let (status, Json(body)) =
            health_check(State(state_with_cache(CacheSource::None, true))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.components.cache.status, "disabled");
    }

    #[rstest]
    #[tokio::test]
    async fn test_service_index() {
        let Json(body) = service_index().await;
        assert_eq!(body.name, "one-time-secrets");
        assert!(body.endpoints.contains(&"POST /secret"));
    }
}
