//! Token vault using AES-256-GCM
//!
//! Encryption and decryption utilities for the provider tokens stored on
//! connections, using AES-256-GCM with additional authenticated data (AAD)
//! binding each ciphertext to its connection. Decryption tolerates two
//! legacy at-rest formats that predate the versioned AEAD envelope:
//! bare base64 and bare plaintext.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::models::connection::Model as ConnectionModel;

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Envelope: version byte, nonce, then ciphertext + tag.
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt a versioned AEAD envelope using AES-256-GCM.
///
/// Requires the version marker; callers that may hold legacy payloads go
/// through [`decrypt_stored_token`] instead.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidFormat);
    }

    // Version + nonce + tag is the smallest well-formed envelope.
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Determine if a payload is using the versioned encrypted format
pub fn is_encrypted_payload(ciphertext: &[u8]) -> bool {
    ciphertext.len() >= MIN_ENCRYPTED_LEN && ciphertext[0] == VERSION_ENCRYPTED
}

/// Decrypt a stored token, tolerating pre-envelope formats.
///
/// Resolution order:
/// 1. versioned AEAD envelope (authenticated against `aad`)
/// 2. bare base64 of the token
/// 3. bare UTF-8 plaintext
///
/// Legacy payloads are flagged so callers can schedule re-encryption.
pub fn decrypt_stored_token(
    key: &CryptoKey,
    aad: &[u8],
    stored: &[u8],
) -> Result<(String, bool), CryptoError> {
    if stored.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if is_encrypted_payload(stored) {
        let bytes = decrypt_bytes(key, aad, stored)?;
        let token = String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))?;
        return Ok((token, false));
    }

    if let Ok(text) = std::str::from_utf8(stored)
        && let Ok(decoded) = BASE64.decode(text.trim())
        && let Ok(token) = String::from_utf8(decoded)
        && !token.is_empty()
    {
        tracing::warn!("Stored token is legacy base64; scheduling re-encryption");
        return Ok((token, true));
    }

    match String::from_utf8(stored.to_vec()) {
        Ok(token) => {
            tracing::warn!("Stored token is legacy plaintext; scheduling re-encryption");
            Ok((token, true))
        }
        Err(e) => Err(CryptoError::DecryptionFailed(format!(
            "Invalid UTF-8: {}",
            e
        ))),
    }
}

/// AAD binding a token ciphertext to its connection row.
fn connection_aad(connection: &ConnectionModel) -> String {
    format!("{}|{}", connection.id, connection.token_salt)
}

/// Type alias for encrypted token result
type EncryptedTokens = Result<(Option<Vec<u8>>, Option<Vec<u8>>), CryptoError>;

/// Encrypt tokens for a connection model
pub fn encrypt_connection_tokens(
    key: &CryptoKey,
    connection: &ConnectionModel,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let aad = connection_aad(connection);

    let encrypted_access_token = access_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    let encrypted_refresh_token = refresh_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    Ok((encrypted_access_token, encrypted_refresh_token))
}

/// Decrypted connection tokens plus whether either side needs re-encryption.
#[derive(Debug, Clone, Default)]
pub struct DecryptedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// True when any token was stored in a legacy format.
    pub needs_reencryption: bool,
}

/// Decrypt tokens for a connection model
pub fn decrypt_connection_tokens(
    key: &CryptoKey,
    connection: &ConnectionModel,
) -> Result<DecryptedTokens, CryptoError> {
    let aad = connection_aad(connection);
    let mut out = DecryptedTokens::default();

    if let Some(stored) = connection.access_token_ciphertext.as_ref() {
        let (token, legacy) = decrypt_stored_token(key, aad.as_bytes(), stored)?;
        out.access_token = Some(token);
        out.needs_reencryption |= legacy;
    }

    if let Some(stored) = connection.refresh_token_ciphertext.as_ref() {
        let (token, legacy) = decrypt_stored_token(key, aad.as_bytes(), stored)?;
        out.refresh_token = Some(token);
        out.needs_reencryption |= legacy;
    }

    Ok(out)
}
