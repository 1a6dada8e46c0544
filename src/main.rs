//! One-Time Secrets API
//!
//! HTTP service for sharing secrets that can be read exactly once.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` | `postgres` (inferred from the database settings)
//! - `CACHE_MODE`: `in_memory` | `redis` | `none` (inferred from the Redis settings)
//! - `DATABASE_URL` or `POSTGRES_HOST`, `POSTGRES_PORT`, `POSTGRES_DB`,
//!   `POSTGRES_USER`, `POSTGRES_PASSWORD`
//! - `REDIS_URL` or `REDIS_HOST`, `REDIS_PORT`
//! - `SECRET_ENCRYPTION_KEY`: base64-encoded 32-byte key
//! - `RUST_LOG`: Logging filter (default: `one_time_secrets=debug,tower_http=debug`)
//! - `LOG_FORMAT`: `json` for structured output
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `8000`)
//! - `WORKER_THREADS`: Number of tokio worker threads (default: logical CPU count)
//! - `PURGE_INTERVAL_SECONDS`: Seconds between purges of expired secrets
//!   (default: 60, `0` disables)

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use one_time_secrets::api::{AppConfig, AppState, build_router};
use one_time_secrets::domain::Timestamp;
use one_time_secrets::infrastructure::factory::redact_url;
use one_time_secrets::infrastructure::{RepositoryFactory, SecretCache, SecretRepository};

const DEFAULT_PORT: u16 = 8000;

/// Result of parsing `WORKER_THREADS` environment variable.
struct WorkerThreadsResult {
    threads: Option<usize>,
    warning_emitted: bool,
}

fn parse_worker_threads() -> WorkerThreadsResult {
    let Ok(value) = env::var("WORKER_THREADS") else {
        return WorkerThreadsResult {
            threads: None,
            warning_emitted: false,
        };
    };

    let trimmed = value.trim();

    if trimmed.is_empty() {
        return WorkerThreadsResult {
            threads: None,
            warning_emitted: false,
        };
    }

    match trimmed.parse::<usize>() {
        Ok(0) => {
            eprintln!("Warning: WORKER_THREADS=0 is invalid (must be > 0), using default");
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
        Ok(n) => {
            let max_threads = std::thread::available_parallelism()
                .map(|parallelism| parallelism.get().saturating_mul(4))
                .unwrap_or(64);
            if n > max_threads {
                eprintln!(
                    "Warning: WORKER_THREADS={n} exceeds recommended limit ({max_threads}), capping to {max_threads}"
                );
                WorkerThreadsResult {
                    threads: Some(max_threads),
                    warning_emitted: true,
                }
            } else {
                WorkerThreadsResult {
                    threads: Some(n),
                    warning_emitted: false,
                }
            }
        }
        Err(error) => {
            eprintln!(
                "Warning: WORKER_THREADS='{trimmed}' is not a valid number ({error}), using default"
            );
            WorkerThreadsResult {
                threads: None,
                warning_emitted: true,
            }
        }
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let result = parse_worker_threads();
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();

    if let Some(threads) = result.threads {
        builder.worker_threads(threads);
        if !result.warning_emitted {
            eprintln!("Tokio worker_threads set to: {threads}");
        }
    } else if !result.warning_emitted {
        eprintln!("Tokio worker_threads: using default (logical CPU count)");
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create tokio runtime: {error}");
            std::process::exit(1);
        }
    };
    runtime.block_on(async_main());
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("one_time_secrets=debug,tower_http=debug"));

    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn async_main() {
    init_tracing();

    tracing::info!("Starting One-Time Secrets API");

    let factory = match RepositoryFactory::from_env() {
        Ok(factory) => factory,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    let application_config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    let config = factory.config();
    tracing::info!(
        storage_mode = ?config.storage_mode,
        cache_mode = ?config.cache_mode,
        database_url = ?config.database_url.as_deref().map(redact_url),
        redis_url = ?config.redis_url.as_deref().map(redact_url),
        "Repository configuration loaded"
    );

    let cipher = match factory.create_cipher() {
        Ok(cipher) => cipher,
        Err(error) => {
            tracing::error!("Failed to initialize encryption: {}", error);
            std::process::exit(1);
        }
    };

    let repositories = match factory.create().await {
        Ok(repositories) => {
            tracing::info!("Repositories initialized successfully");
            repositories
        }
        Err(error) => {
            tracing::error!("Failed to initialize repositories: {}", error);
            std::process::exit(1);
        }
    };

    if application_config.purge_interval_seconds > 0 {
        spawn_purge_task(
            Arc::clone(&repositories.secret_repository),
            Arc::clone(&repositories.secret_cache),
            Duration::from_secs(application_config.purge_interval_seconds),
        );
    } else {
        tracing::info!("Expired secret purging disabled");
    }

    let application_state = AppState::with_config(repositories, cipher, application_config);

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let application = build_router(application_state).layer(cors);

    // Parse server address from environment
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let address: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address: {}:{}", host, port);
            std::process::exit(1);
        }
    };

    // Start the server
    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(
        listener,
        application.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

/// Periodically scrubs expired, unread secrets and drops stale cache entries.
fn spawn_purge_task(
    repository: Arc<dyn SecretRepository>,
    cache: Arc<dyn SecretCache>,
    period: Duration,
) {
    tracing::info!(interval = ?period, "Starting expired secret purge task");

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match repository.purge_expired(&Timestamp::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired secrets"),
                Err(error) => tracing::warn!(%error, "Failed to purge expired secrets"),
            }
            match cache.evict_expired().await {
                Ok(0) => {}
                Ok(evicted) => tracing::debug!(evicted, "Evicted stale cache entries"),
                Err(error) => tracing::warn!(%error, "Failed to evict stale cache entries"),
            }
        }
    });
}

/// Handles graceful shutdown signals (SIGINT, SIGTERM).
///
/// On Unix systems, it listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On other systems, it only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
