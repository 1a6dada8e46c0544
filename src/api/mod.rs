//! API module for HTTP handlers.
//!
//! This module contains route definitions, request/response handlers,
//! and HTTP middleware.

pub mod cache_header;
pub mod client;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod secrets;

pub use cache_header::{CacheHeaderExtension, NoStoreLayer, build_cache_headers};
pub use client::ClientAddress;
pub use dto::{
    AuditEntryResponse, CreateSecretRequest, CreateSecretResponse, DeleteSecretResponse,
    PassphraseQuery, SecretResponse,
};
pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use handlers::{AppConfig, AppState, HealthResponse, build_router, health_check, service_index};
pub use secrets::{create_secret, delete_secret, list_secret_logs, read_secret};
