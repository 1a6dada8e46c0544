//! Encryption of secret payloads and hashing of passphrases.
//!
//! # Payload format
//!
//! Sealed payloads are base64 (standard alphabet) of `nonce[12] || ciphertext || tag[16]`
//! produced by AES-256-GCM. The secret key is bound as associated data, so a
//! payload copied onto another record fails to open.
//!
//! # Passphrases
//!
//! Passphrases are hashed with Argon2id using default parameters and stored
//! as PHC strings.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

use crate::domain::SecretKey;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;

/// Errors raised by sealing, opening and hashing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The configured encryption key is not valid base64 or not 32 bytes.
    #[error("Invalid encryption key: {0}")]
    InvalidKey(String),

    /// Encryption failed.
    #[error("Encryption failed")]
    Encryption,

    /// Wrong key, tampered payload, or payload bound to another secret.
    #[error("Decryption failed")]
    Decryption,

    /// The sealed payload is not valid base64 or too short.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The stored passphrase hash cannot be parsed.
    #[error("Invalid passphrase hash: {0}")]
    InvalidHash(String),

    /// Hashing the passphrase failed.
    #[error("Passphrase hashing failed: {0}")]
    Hashing(String),
}

// =============================================================================
// Secret Cipher
// =============================================================================

/// AES-256-GCM cipher for secret payloads.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SecretCipher")
            .field("cipher", &"Aes256Gcm(<redacted>)")
            .finish()
    }
}

impl SecretCipher {
    /// Creates a cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if the key is not 32 bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_SIZE} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|error| CryptoError::InvalidKey(error.to_string()))?;
        Ok(Self { cipher })
    }

    /// Creates a cipher from a base64-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKey` if decoding fails or the length is wrong.
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|error| CryptoError::InvalidKey(error.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Creates a cipher with a random key that lives only as long as the process.
    #[must_use]
    pub fn generate() -> Self {
        let key: [u8; KEY_SIZE] = rand::random();
        Self {
            cipher: Aes256Gcm::new(&key.into()),
        }
    }

    /// Encrypts `plaintext` for the secret addressed by `secret_key`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the AEAD operation fails.
    pub fn seal(&self, secret_key: &SecretKey, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: secret_key.as_uuid().as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encryption)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypts a payload produced by [`seal`](Self::seal) for the same secret key.
    ///
    /// # Errors
    ///
    /// - `CryptoError::MalformedPayload` if the payload is not decodable
    /// - `CryptoError::Decryption` on authentication failure
    pub fn open(&self, secret_key: &SecretKey, sealed: &str) -> Result<String, CryptoError> {
        let data = BASE64
            .decode(sealed)
            .map_err(|error| CryptoError::MalformedPayload(error.to_string()))?;

        if data.len() <= NONCE_SIZE {
            return Err(CryptoError::MalformedPayload("payload too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: secret_key.as_uuid().as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Decryption)?;

        String::from_utf8(plaintext)
            .map_err(|error| CryptoError::MalformedPayload(error.to_string()))
    }
}

// =============================================================================
// Passphrases
// =============================================================================

/// Hashes a passphrase with Argon2id and a random salt.
///
/// CPU-bound; call from `tokio::task::spawn_blocking` inside handlers.
///
/// # Errors
///
/// Returns `CryptoError::Hashing` if Argon2 rejects the input.
pub fn hash_passphrase(passphrase: &str) -> Result<String, CryptoError> {
    let salt_bytes: [u8; SALT_SIZE] = rand::random();
    let salt =
        SaltString::encode_b64(&salt_bytes).map_err(|error| CryptoError::Hashing(error.to_string()))?;

    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| CryptoError::Hashing(error.to_string()))
}

/// Verifies a passphrase against a stored PHC hash.
///
/// # Errors
///
/// Returns `CryptoError::InvalidHash` if `hash` is not a valid PHC string.
pub fn verify_passphrase(candidate: &str, hash: &str) -> Result<bool, CryptoError> {
    let parsed =
        PasswordHash::new(hash).map_err(|error| CryptoError::InvalidHash(error.to_string()))?;
    Ok(Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok())
}

// =============================================================================
// Tests
// =============================================================================
