//! One-time secret sharing service.
//!
//! A client posts a secret and receives an opaque key. The first read of
//! that key returns the plaintext and destroys it; every later read fails.

pub mod api;
pub mod domain;
pub mod infrastructure;
