//! Credential sealing using AES-256-GCM
//!
//! Stored provider secrets are encrypted with a random 96-bit nonce and bound
//! to their owner through additional authenticated data
//! (`user_id|provider_identifier`). Layout: version byte, nonce, ciphertext
//! with tag.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("unsupported ciphertext version {0:#04x}")]
    UnsupportedVersion(u8),
    #[error("invalid ciphertext format")]
    InvalidFormat,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKey([REDACTED])")
    }
}

/// AAD binding a sealed secret to its owner.
pub fn credential_aad(user_id: Uuid, provider_identifier: &str) -> Vec<u8> {
    format!("{}|{}", user_id, provider_identifier).into_bytes()
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
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

    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let Some(&version) = ciphertext.first() else {
        return Err(CryptoError::InvalidFormat);
    };
    if version != VERSION_ENCRYPTED {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    if ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let sealed = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(nonce, Payload { msg: sealed, aad })
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn sealed_secret_opens_with_same_owner() {
        let key = test_key();
        let user = Uuid::new_v4();
        let aad = credential_aad(user, "github");

        let sealed = encrypt_bytes(&key, &aad, br#"{"api_key":"k"}"#).unwrap();
        let opened = decrypt_bytes(&key, &aad, &sealed).unwrap();

        assert_eq!(opened, br#"{"api_key":"k"}"#);
    }

    #[test]
    fn secret_sealed_for_other_provider_is_rejected() {
        let key = test_key();
        let user = Uuid::new_v4();

        let sealed = encrypt_bytes(&key, &credential_aad(user, "github"), b"secret").unwrap();
        let result = decrypt_bytes(&key, &credential_aad(user, "notion"), &sealed);

        assert!(matches!(result, Err(CryptoError::DecryptionFailed(_))));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = test_key();
        let mut sealed = encrypt_bytes(&key, b"aad", b"secret message").unwrap();
        sealed[13] ^= 0x01;

        assert!(decrypt_bytes(&key, b"aad", &sealed).is_err());
    }

    #[test]
    fn nonces_differ_between_seals() {
        let key = test_key();
        let first = encrypt_bytes(&key, b"aad", b"same").unwrap();
        let second = encrypt_bytes(&key, b"aad", b"same").unwrap();

        assert_ne!(&first[1..13], &second[1..13]);
    }

    #[test]
    fn unversioned_payload_is_not_treated_as_plaintext() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"aad", b"plain-token");
        assert!(matches!(result, Err(CryptoError::UnsupportedVersion(b'p'))));
    }

    #[test]
    fn short_payload_is_invalid() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"aad", &[VERSION_ENCRYPTED, 0x02]);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
        assert!(matches!(
            decrypt_bytes(&key, b"aad", &[]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn key_length_is_enforced() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
    }
}
