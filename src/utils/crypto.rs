//! Cookie codec and random token generation
//!
//! Cookie values are sealed with AES-256-GCM and serialised in the JWE compact
//! layout (`header.encrypted_key.iv.ciphertext.tag`, all base64url without
//! padding). Only direct key agreement (`alg: dir`) with `enc: A256GCM` is
//! produced or accepted; the protected header is bound to the ciphertext as
//! additional authenticated data.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Authentication tag size for AES-256-GCM (128 bits)
pub const TAG_SIZE: usize = 16;

const ALGORITHM: &str = "dir";
const CONTENT_ENCRYPTION: &str = "A256GCM";

/// Why a token could not be opened.
///
/// Callers must not surface the variant to clients; every error means "no valid session".
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("token is malformed")]
    Malformed,
    #[error("token failed integrity verification")]
    Tampered,
    #[error("token payload does not match the expected shape")]
    SchemaMismatch,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProtectedHeader {
    alg: String,
    enc: String,
}

/// Authenticated encryption of small payloads into cookie-safe tokens
#[derive(Clone)]
pub struct CookieCodec {
    cipher: Aes256Gcm,
    encoded_header: String,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("alg", &ALGORITHM)
            .field("enc", &CONTENT_ENCRYPTION)
            .finish_non_exhaustive()
    }
}

impl CookieCodec {
    /// Create a codec bound to a single 256-bit key
    #[must_use]
    pub fn new(key: &[u8; ENCRYPTION_KEY_SIZE]) -> Self {
        let header = ProtectedHeader {
            alg: ALGORITHM.to_string(),
            enc: CONTENT_ENCRYPTION.to_string(),
        };
        // A two-string struct always serialises
        let header_json = serde_json::to_vec(&header).unwrap_or_default();

        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
            encoded_header: general_purpose::URL_SAFE_NO_PAD.encode(header_json),
        }
    }

    /// Serialize and seal a payload. Every call uses a fresh random IV.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Serialization fails
    /// - AES encryption fails
    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<String> {
        let plaintext = serde_json::to_vec(payload).context("Failed to serialize payload")?;

        let mut iv = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut iv);

        let sealed = self
            .cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &plaintext,
                    aad: self.encoded_header.as_bytes(),
                },
            )
            .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

        Ok(format!(
            "{}..{}.{}.{}",
            self.encoded_header,
            general_purpose::URL_SAFE_NO_PAD.encode(iv),
            general_purpose::URL_SAFE_NO_PAD.encode(ciphertext),
            general_purpose::URL_SAFE_NO_PAD.encode(tag),
        ))
    }

    /// Verify and open a token produced by [`CookieCodec::encode`]
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] for structurally invalid tokens,
    /// [`DecodeError::Tampered`] when authentication fails (including tokens
    /// sealed under another key) and [`DecodeError::SchemaMismatch`] when the
    /// plaintext does not deserialize into `T`.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, DecodeError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, encrypted_key, iv, ciphertext, tag] = segments.as_slice() else {
            return Err(DecodeError::Malformed);
        };

        let header_bytes = decode_segment(header)?;
        let protected: ProtectedHeader =
            serde_json::from_slice(&header_bytes).map_err(|_| DecodeError::Malformed)?;
        if protected.alg != ALGORITHM || protected.enc != CONTENT_ENCRYPTION {
            return Err(DecodeError::Malformed);
        }
        if !encrypted_key.is_empty() {
            return Err(DecodeError::Malformed);
        }

        let iv = decode_segment(iv)?;
        let tag = decode_segment(tag)?;
        if iv.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return Err(DecodeError::Malformed);
        }

        let mut sealed = decode_segment(ciphertext)?;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: &sealed,
                    aad: header.as_bytes(),
                },
            )
            .map_err(|_| DecodeError::Tampered)?;

        serde_json::from_slice(&plaintext).map_err(|_| DecodeError::SchemaMismatch)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, DecodeError> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| DecodeError::Malformed)
}

/// Decode a base64 (standard or URL-safe) 256-bit key
///
/// # Errors
///
/// Returns an error if the input is not base64 or does not decode to exactly 32 bytes
pub fn decode_key(encoded: &str) -> Result<[u8; ENCRYPTION_KEY_SIZE]> {
    let trimmed = encoded.trim();
    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
        .context("Key is not valid base64")?;

    <[u8; ENCRYPTION_KEY_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
        anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            bytes.len()
        )
    })
}

/// Generate a fresh random 256-bit key
#[must_use]
pub fn generate_key() -> [u8; ENCRYPTION_KEY_SIZE] {
    let mut key = [0u8; ENCRYPTION_KEY_SIZE];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Encode a key for storage in a key file or environment variable
#[must_use]
pub fn encode_key(key: &[u8; ENCRYPTION_KEY_SIZE]) -> String {
    general_purpose::STANDARD.encode(key)
}

/// Generate a cryptographically secure CSRF token
///
/// 24 bytes (192 bits) of entropy, base64url-encoded to 32 characters.
#[must_use]
pub fn generate_csrf_token() -> String {
    generate_nonce(24)
}

/// Generate a base64url-encoded random value of `length` bytes
#[must_use]
pub fn generate_nonce(length: usize) -> String {
    let mut nonce = vec![0u8; length];
    rand::rng().fill_bytes(&mut nonce);
    general_purpose::URL_SAFE_NO_PAD.encode(nonce)
}

/// Generate a unique session identifier
#[must_use]
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Compare two secrets without short-circuiting on the first differing byte
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
