//! Token encryption module using AES-256-GCM
//!
//! Encrypts the token tuple {access_token, refresh_token, expires_at, scopes}
//! at rest. A per-integration key is derived from the master secret with
//! PBKDF2 so decryption can re-derive without storing per-record keys. The
//! plaintext embeds a SHA-256 integrity hash over the canonical tuple fields,
//! checked after GCM authentication so a crafted-but-authentic payload is
//! still rejected, distinctly from a tamper failure.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use chrono::{DateTime, Utc};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

const KEY_LEN: usize = 32;
/// PBKDF2-HMAC-SHA256 iteration count for per-integration key derivation.
pub const PBKDF2_ROUNDS: u32 = 100_000;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,
    /// GCM authentication failure, unparseable plaintext, or any other
    /// low-level failure. Deliberately carries no detail: callers must not be
    /// able to distinguish tamper modes (oracle avoidance).
    #[error("failed to decrypt token blob")]
    DecryptionFailed,
    /// The blob decrypted and authenticated, but the embedded integrity hash
    /// does not match the tuple fields. Distinct from [`DecryptionFailed`]
    /// so the store can flag a crafted plaintext as a hard failure.
    #[error("token integrity violation")]
    IntegrityViolation,
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength);
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Decrypted token material for one integration.
///
/// Field order is load-bearing: the canonical JSON used for the integrity
/// hash serializes fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTuple {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl TokenTuple {
    /// SHA-256 hex digest over the canonical JSON of the four tuple fields.
    pub fn integrity_hash(&self) -> String {
        let canonical =
            serde_json::to_string(self).expect("token tuple serialization is infallible");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Plaintext envelope persisted inside the GCM ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct TokenEnvelope {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    scopes: Vec<String>,
    integrity: String,
}

impl TokenEnvelope {
    fn seal(tuple: &TokenTuple) -> Self {
        Self {
            access_token: tuple.access_token.clone(),
            refresh_token: tuple.refresh_token.clone(),
            expires_at: tuple.expires_at,
            scopes: tuple.scopes.clone(),
            integrity: tuple.integrity_hash(),
        }
    }

    fn open(self) -> Result<TokenTuple, CryptoError> {
        let tuple = TokenTuple {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_at,
            scopes: self.scopes,
        };
        if tuple.integrity_hash() != self.integrity {
            return Err(CryptoError::IntegrityViolation);
        }
        Ok(tuple)
    }
}

/// Derive the per-integration key: PBKDF2-HMAC-SHA256 over the master secret
/// with the integration id as salt. Deterministic, so decryption re-derives.
pub fn derive_key(master_secret: &[u8], integration_id: Uuid) -> CryptoKey {
    let salt = integration_id.to_string();
    let mut key = vec![0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(master_secret, salt.as_bytes(), PBKDF2_ROUNDS, &mut key);
    ZeroizingKey(key)
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
        .map_err(|_| CryptoError::EncryptionFailed)?;

    // Blob layout: version byte || nonce || ciphertext+tag
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
///
/// Fails closed: blobs without the version marker are rejected, never
/// returned as plaintext.
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

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
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Encrypt a token tuple for one integration.
///
/// The integration id is bound twice: as AAD on the ciphertext and as salt in
/// the derived key, so a blob swapped between rows fails to decrypt.
pub fn encrypt_tuple(
    key: &CryptoKey,
    integration_id: Uuid,
    tuple: &TokenTuple,
) -> Result<Vec<u8>, CryptoError> {
    let envelope = TokenEnvelope::seal(tuple);
    let plaintext = serde_json::to_vec(&envelope).map_err(|_| CryptoError::EncryptionFailed)?;
    let aad = integration_id.to_string();
    encrypt_bytes(key, aad.as_bytes(), &plaintext)
}

/// Decrypt a token tuple, verifying both the GCM tag and the embedded
/// integrity hash.
pub fn decrypt_tuple(
    key: &CryptoKey,
    integration_id: Uuid,
    blob: &[u8],
) -> Result<TokenTuple, CryptoError> {
    let aad = integration_id.to_string();
    let plaintext = decrypt_bytes(key, aad.as_bytes(), blob)?;
    let envelope: TokenEnvelope =
        serde_json::from_slice(&plaintext).map_err(|_| CryptoError::DecryptionFailed)?;
    envelope.open()
}

/// Trailing GCM auth tag of an encrypted blob, used as a cache freshness key.
pub fn blob_auth_tag(blob: &[u8]) -> Option<[u8; TAG_LEN]> {
    if blob.len() < MIN_ENCRYPTED_LEN || blob[0] != VERSION_ENCRYPTED {
        return None;
    }
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&blob[blob.len() - TAG_LEN..]);
    Some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    fn sample_tuple() -> TokenTuple {
        TokenTuple {
            access_token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
            scopes: vec!["calendar.readonly".to_string(), "openid".to_string()],
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let id = Uuid::new_v4();
        let tuple = sample_tuple();

        let blob = encrypt_tuple(&key, id, &tuple).expect("encryption succeeds");
        let decrypted = decrypt_tuple(&key, id, &blob).expect("decryption succeeds");

        assert_eq!(decrypted, tuple);
    }

    #[test]
    fn test_tamper_any_region_fails_as_decryption_failure() {
        let key = test_key();
        let id = Uuid::new_v4();
        let blob = encrypt_tuple(&key, id, &sample_tuple()).expect("encryption succeeds");

        // Nonce, ciphertext body, and trailing tag bytes respectively.
        for index in [2usize, 20, blob.len() - 1] {
            let mut tampered = blob.clone();
            tampered[index] ^= 0x01;
            let result = decrypt_tuple(&key, id, &tampered);
            assert!(
                matches!(result, Err(CryptoError::DecryptionFailed)),
                "byte {index} flip must fail closed"
            );
        }
    }

    #[test]
    fn test_integration_id_binding() {
        let key = test_key();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        let blob = encrypt_tuple(&key, id, &sample_tuple()).expect("encryption succeeds");

        // Same key, wrong AAD: blob must not decrypt under a different id.
        let result = decrypt_tuple(&key, other, &blob);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_crafted_integrity_mismatch_is_distinct() {
        let key = test_key();
        let id = Uuid::new_v4();
        let tuple = sample_tuple();

        // Simulate a crafted plaintext: valid GCM encryption over an envelope
        // whose integrity field does not match the tuple.
        let envelope = TokenEnvelope {
            access_token: tuple.access_token.clone(),
            refresh_token: tuple.refresh_token.clone(),
            expires_at: tuple.expires_at,
            scopes: tuple.scopes.clone(),
            integrity: "0".repeat(64),
        };
        let plaintext = serde_json::to_vec(&envelope).unwrap();
        let aad = id.to_string();
        let blob = encrypt_bytes(&key, aad.as_bytes(), &plaintext).unwrap();

        let result = decrypt_tuple(&key, id, &blob);
        assert!(matches!(result, Err(CryptoError::IntegrityViolation)));
    }

    #[test]
    fn test_derive_key_is_deterministic_per_integration() {
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();

        let a = derive_key(b"master-secret", id);
        let b = derive_key(b"master-secret", id);
        let c = derive_key(b"master-secret", other);
        let d = derive_key(b"other-secret", id);

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_ne!(a.as_bytes(), d.as_bytes());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let id = Uuid::new_v4();
        let tuple = sample_tuple();

        let blob1 = encrypt_tuple(&key, id, &tuple).unwrap();
        let blob2 = encrypt_tuple(&key, id, &tuple).unwrap();

        assert_ne!(&blob1[1..13], &blob2[1..13]);
        assert_eq!(decrypt_tuple(&key, id, &blob1).unwrap(), tuple);
        assert_eq!(decrypt_tuple(&key, id, &blob2).unwrap(), tuple);
    }

    #[test]
    fn test_unversioned_blob_fails_closed() {
        let key = test_key();
        let id = Uuid::new_v4();

        let result = decrypt_tuple(&key, id, b"plaintext-token-material-here-long-enough");
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_empty_and_short_blobs() {
        let key = test_key();
        let id = Uuid::new_v4();

        assert!(matches!(
            decrypt_tuple(&key, id, b""),
            Err(CryptoError::EmptyCiphertext)
        ));
        assert!(matches!(
            decrypt_tuple(&key, id, &[VERSION_ENCRYPTED, 0x02]),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_blob_auth_tag_changes_with_content() {
        let key = test_key();
        let id = Uuid::new_v4();
        let mut tuple = sample_tuple();

        let blob1 = encrypt_tuple(&key, id, &tuple).unwrap();
        tuple.access_token = "rotated".to_string();
        let blob2 = encrypt_tuple(&key, id, &tuple).unwrap();

        let tag1 = blob_auth_tag(&blob1).unwrap();
        let tag2 = blob_auth_tag(&blob2).unwrap();
        assert_ne!(tag1, tag2);
        assert!(blob_auth_tag(b"short").is_none());
    }

    #[test]
    fn test_integrity_hash_is_stable() {
        let tuple = sample_tuple();
        assert_eq!(tuple.integrity_hash(), tuple.integrity_hash());

        let mut altered = sample_tuple();
        altered.scopes.pop();
        assert_ne!(tuple.integrity_hash(), altered.integrity_hash());
    }
}
