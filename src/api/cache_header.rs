//! Response header support for cache status and no-store policy.
//!
//! # Headers
//!
//! - `X-Cache`: `HIT` | `MISS` (cache hit/miss status)
//! - `X-Cache-Status`: `hit` | `miss` | `bypass` | `error` (detailed status)
//! - `X-Cache-Source`: `redis` | `memory` | `none` (cache source type)
//!
//! Cache status is only known after the handler has consulted the cache, so
//! handlers attach these headers themselves via [`build_cache_headers`].
//! They are only attached to successful reads.
//!
//! # No-store policy
//!
//! Every response, including errors, carries:
//!
//! - `Cache-Control: no-cache, no-store, must-revalidate`
//! - `Pragma: no-cache`
//! - `Expires: 0`
//!
//! [`NoStoreLayer`] applies these to every route.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/secret/{secret_key}", get(read_secret))
//!     .layer(NoStoreLayer::new());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, EXPIRES, PRAGMA};
use axum::http::{HeaderMap, HeaderValue, Request, Response};
use tower::{Layer, Service};

use crate::infrastructure::{CacheSource, CacheStatus};

// =============================================================================
// Cache Header Extension
// =============================================================================

/// Cache status information for a single read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeaderExtension {
    /// The cache operation status.
    pub status: CacheStatus,
    /// The source of the cached data.
    pub source: CacheSource,
}

impl CacheHeaderExtension {
    #[must_use]
    pub const fn new(status: CacheStatus, source: CacheSource) -> Self {
        Self { status, source }
    }

    /// Bypass: no cache layer was consulted (source is `None`).
    #[must_use]
    pub const fn bypass() -> Self {
        Self::new(CacheStatus::Bypass, CacheSource::None)
    }

    /// Returns `"HIT"` for cache hit, `"MISS"` for all other statuses.
    #[must_use]
    pub const fn x_cache_value(&self) -> &'static str {
        match self.status {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss | CacheStatus::Bypass | CacheStatus::Error => "MISS",
        }
    }

    #[must_use]
    pub const fn x_cache_status_value(&self) -> &'static str {
        self.status.as_str()
    }

    #[must_use]
    pub const fn x_cache_source_value(&self) -> &'static str {
        self.source.as_str()
    }
}

/// Builds the `X-Cache*` headers for a read response.
#[must_use]
pub fn build_cache_headers(extension: CacheHeaderExtension) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("X-Cache", HeaderValue::from_static(extension.x_cache_value()));
    headers.insert(
        "X-Cache-Status",
        HeaderValue::from_static(extension.x_cache_status_value()),
    );
    headers.insert(
        "X-Cache-Source",
        HeaderValue::from_static(extension.x_cache_source_value()),
    );
    headers
}

// =============================================================================
// No-Store Layer
// =============================================================================

/// Tower layer that forbids clients and proxies from storing responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStoreLayer;

impl NoStoreLayer {
    /// Creates a new no-store layer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for NoStoreLayer {
    type Service = NoStoreService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        NoStoreService { inner }
    }
}

/// Service created by [`NoStoreLayer`].
#[derive(Debug, Clone)]
pub struct NoStoreService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for NoStoreService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, context: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(context)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // The clone may not be ready; swap so the readied service handles this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(request).await?;
            apply_no_store_headers(response.headers_mut());
            Ok(response)
        })
    }
}

/// Overwrites the caching headers with the no-store policy.
pub fn apply_no_store_headers(headers: &mut HeaderMap) {
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::convert::Infallible;
    use tower::ServiceExt;

    #[rstest]
    #[case(CacheStatus::Hit, CacheSource::Redis, "HIT", "hit", "redis")]
    #[case(CacheStatus::Miss, CacheSource::Redis, "MISS", "miss", "redis")]
    #[case(CacheStatus::Bypass, CacheSource::None, "MISS", "bypass", "none")]
    #[case(CacheStatus::Error, CacheSource::Redis, "MISS", "error", "redis")]
    #[case(CacheStatus::Hit, CacheSource::Memory, "HIT", "hit", "memory")]
    #[case(CacheStatus::Miss, CacheSource::Memory, "MISS", "miss", "memory")]
    fn test_header_values(
        #[case] status: CacheStatus,
        #[case] source: CacheSource,
        #[case] expected_x_cache: &str,
        #[case] expected_x_cache_status: &str,
        #[case] expected_x_cache_source: &str,
    ) {
        let extension = CacheHeaderExtension::new(status, source);
        assert_eq!(extension.x_cache_value(), expected_x_cache);
        assert_eq!(extension.x_cache_status_value(), expected_x_cache_status);
        assert_eq!(extension.x_cache_source_value(), expected_x_cache_source);
    }

    #[rstest]
    fn test_build_cache_headers() {
        let headers =
            build_cache_headers(CacheHeaderExtension::new(CacheStatus::Hit, CacheSource::Redis));
        assert_eq!(headers.get("X-Cache").unwrap(), "HIT");
        assert_eq!(headers.get("X-Cache-Status").unwrap(), "hit");
        assert_eq!(headers.get("X-Cache-Source").unwrap(), "redis");
    }

    #[rstest]
    fn test_bypass() {
        let extension = CacheHeaderExtension::bypass();
        assert_eq!(extension.status, CacheStatus::Bypass);
        assert_eq!(extension.source, CacheSource::None);
    }

    #[rstest]
    #[tokio::test]
    async fn test_no_store_layer_overrides_headers() {
        let inner = tower::service_fn(|_request: Request<Body>| async {
            let mut response = Response::new(Body::empty());
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("max-age=3600"));
            Ok::<_, Infallible>(response)
        });

        let response = NoStoreLayer::new()
            .layer(inner)
            .oneshot(Request::new(Body::empty()))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get(EXPIRES).unwrap(), "0");
    }
}
