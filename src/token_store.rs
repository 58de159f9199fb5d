//! Encrypted token persistence with a short-lived decryption cache.
//!
//! The store is the only component that touches token ciphertexts. Writes
//! encrypt the full token tuple under the integration's derived key and
//! invalidate the cache entry before returning, so a retrieve that follows a
//! store always observes the new tuple. Reads decrypt at most once per cache
//! TTL; a cached entry is only served while the stored blob still carries
//! the same GCM auth tag it was decrypted from.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sea_orm::Set;
use thiserror::Error;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::{self, CryptoError, TokenTuple};
use crate::models::integration;
use crate::models::provider::IntegrationStatus;
use crate::repositories::IntegrationRepository;

const CACHE_CAPACITY: usize = 1024;
/// How long a decrypted tuple may be served from cache.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// Errors surfaced by token store operations.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("integration '{0}' not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("token store database operation failed: {0}")]
    Database(#[from] anyhow::Error),
}

struct CachedEntry {
    tuple: TokenTuple,
    /// Auth tag of the blob this entry was decrypted from.
    tag: [u8; 16],
    stored_at: Instant,
}

impl CachedEntry {
    fn is_valid_for(&self, blob: &[u8], ttl: Duration) -> bool {
        if self.stored_at.elapsed() > ttl {
            return false;
        }
        match crypto::blob_auth_tag(blob) {
            Some(tag) => tag == self.tag,
            None => false,
        }
    }
}

/// Encrypted token store over the integrations table.
pub struct TokenStore {
    repo: IntegrationRepository,
    master_secret: Zeroizing<Vec<u8>>,
    cache: Mutex<LruCache<Uuid, CachedEntry>>,
    ttl: Duration,
}

impl TokenStore {
    pub fn new(repo: IntegrationRepository, master_secret: Vec<u8>) -> Self {
        Self::with_ttl(repo, master_secret, CACHE_TTL)
    }

    pub fn with_ttl(repo: IntegrationRepository, master_secret: Vec<u8>, ttl: Duration) -> Self {
        Self {
            repo,
            master_secret: Zeroizing::new(master_secret),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).expect("capacity is non-zero"),
            )),
            ttl,
        }
    }

    /// Encrypts `tuple` and persists it on an existing integration row.
    ///
    /// The cache entry is dropped before the write returns, so concurrent
    /// readers never see the previous tuple after this call completes.
    pub async fn store(
        &self,
        integration_id: Uuid,
        tuple: &TokenTuple,
    ) -> Result<integration::Model, TokenStoreError> {
        let (access_ct, refresh_ct) = self.encrypt(integration_id, tuple)?;

        let scopes = serde_json::json!(tuple.scopes);
        let updated = self
            .repo
            .update_tokens_status(
                &integration_id,
                Some(access_ct),
                refresh_ct,
                Some(IntegrationStatus::Connected),
                Some(tuple.expires_at),
                Some(scopes),
            )
            .await?;

        self.invalidate(integration_id);
        Ok(updated)
    }

    /// Encrypt tuple fields for a fresh row that has not been inserted yet.
    pub fn encrypt_for_insert(
        &self,
        integration_id: Uuid,
        tuple: &TokenTuple,
        model: &mut integration::ActiveModel,
    ) -> Result<(), TokenStoreError> {
        let (access_ct, refresh_ct) = self.encrypt(integration_id, tuple)?;
        model.access_token_ciphertext = Set(Some(access_ct));
        model.refresh_token_ciphertext = Set(refresh_ct);
        model.expires_at = Set(tuple.expires_at.map(Into::into));
        model.scopes = Set(Some(serde_json::json!(tuple.scopes)));
        Ok(())
    }

    /// Decrypts the stored tuple for an integration.
    ///
    /// Returns `Ok(None)` when the row exists but carries no token material
    /// (never connected, or disconnected).
    pub async fn retrieve(
        &self,
        integration_id: Uuid,
    ) -> Result<Option<TokenTuple>, TokenStoreError> {
        let row = self
            .repo
            .get_by_id(&integration_id)
            .await?
            .ok_or(TokenStoreError::NotFound(integration_id))?;

        let Some(blob) = row.access_token_ciphertext.as_deref() else {
            return Ok(None);
        };

        {
            let mut cache = self.cache.lock().expect("token cache poisoned");
            if let Some(entry) = cache.get(&integration_id)
                && entry.is_valid_for(blob, self.ttl)
            {
                return Ok(Some(entry.tuple.clone()));
            }
        }

        let key = crypto::derive_key(&self.master_secret, integration_id);
        let tuple = crypto::decrypt_tuple(&key, integration_id, blob)?;

        if let Some(tag) = crypto::blob_auth_tag(blob) {
            let mut cache = self.cache.lock().expect("token cache poisoned");
            cache.put(
                integration_id,
                CachedEntry {
                    tuple: tuple.clone(),
                    tag,
                    stored_at: Instant::now(),
                },
            );
        }

        Ok(Some(tuple))
    }

    /// Nulls stored ciphertexts, marks the row with `status`, and drops the
    /// cache entry.
    pub async fn clear(
        &self,
        integration_id: Uuid,
        status: IntegrationStatus,
    ) -> Result<integration::Model, TokenStoreError> {
        let updated = self.repo.clear_tokens(&integration_id, status).await?;
        self.invalidate(integration_id);
        Ok(updated)
    }

    /// Drops the cached tuple for one integration.
    pub fn invalidate(&self, integration_id: Uuid) {
        let mut cache = self.cache.lock().expect("token cache poisoned");
        cache.pop(&integration_id);
    }

    fn encrypt(
        &self,
        integration_id: Uuid,
        tuple: &TokenTuple,
    ) -> Result<(Vec<u8>, Option<Vec<u8>>), TokenStoreError> {
        let key = crypto::derive_key(&self.master_secret, integration_id);
        let access_ct = crypto::encrypt_tuple(&key, integration_id, tuple)?;
        // The refresh token is duplicated in its own column so the refresh
        // sweep can filter on its presence without decrypting anything.
        let refresh_ct = match tuple.refresh_token.as_deref() {
            Some(refresh) => Some(crypto::encrypt_bytes(
                &key,
                integration_id.to_string().as_bytes(),
                refresh.as_bytes(),
            )?),
            None => None,
        };
        Ok((access_ct, refresh_ct))
    }
}
