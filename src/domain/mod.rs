//! Domain module for one-time secrets.
//!
//! This module contains domain models and value objects.

pub mod audit;
pub mod secret;

pub use audit::{AuditAction, AuditEntry, AuditEntryId};
pub use secret::{Availability, Secret, SecretKey, Timestamp};
