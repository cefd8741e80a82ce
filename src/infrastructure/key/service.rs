//! Key service - creation, verification and lifecycle of keys

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::domain::cache::CacheNamespace;
use crate::domain::key::{
    validate_remaining, Api, ConsumeOutcome, DeleteOutcome, Key, KeyMeta, KeyRepository,
    RemainingUpdate, VerificationCode, VerificationError, VerifiedKey,
};
use crate::domain::{new_id, Clock, DomainError, IdPrefix};
use crate::infrastructure::cache::SwrCache;

use super::generator::{self, DEFAULT_BYTE_LENGTH};

/// Workspace used when a request does not name one
pub const DEFAULT_WORKSPACE_ID: &str = "ws_default";

/// Input for creating a key
#[derive(Debug, Clone, Default)]
pub struct CreateKeyRequest {
    pub api_id: String,
    pub byte_length: Option<usize>,
    pub prefix: Option<String>,
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub meta: Option<KeyMeta>,
    pub remaining: Option<i64>,
    /// Unix millis
    pub expires: Option<i64>,
}

impl CreateKeyRequest {
    pub fn new(api_id: impl Into<String>) -> Self {
        Self {
            api_id: api_id.into(),
            ..Default::default()
        }
    }

    pub fn with_byte_length(mut self, byte_length: usize) -> Self {
        self.byte_length = Some(byte_length);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_meta(mut self, meta: KeyMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_remaining(mut self, remaining: i64) -> Self {
        self.remaining = Some(remaining);
        self
    }

    pub fn with_expires(mut self, expires: i64) -> Self {
        self.expires = Some(expires);
        self
    }
}

/// A freshly created key; `key` is the only copy of the secret
#[derive(Debug, Clone)]
pub struct CreatedKey {
    pub key_id: String,
    pub key: String,
}

/// Service coordinating key storage, the key cache and verification
#[derive(Debug, Clone)]
pub struct KeyService {
    repository: Arc<dyn KeyRepository>,
    cache: SwrCache,
    clock: Arc<dyn Clock>,
}

impl KeyService {
    pub fn new(repository: Arc<dyn KeyRepository>, cache: SwrCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            cache,
            clock,
        }
    }

    /// Checks that the key store is reachable
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.repository.ping().await
    }

    fn now(&self) -> Result<DateTime<Utc>, DomainError> {
        DateTime::from_timestamp_millis(self.clock.now_millis())
            .ok_or_else(|| DomainError::internal("clock is out of range"))
    }

    /// Create a new api
    pub async fn create_api(
        &self,
        name: &str,
        workspace_id: Option<&str>,
    ) -> Result<Api, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }

        let api = Api::new(
            new_id(IdPrefix::Api),
            workspace_id.unwrap_or(DEFAULT_WORKSPACE_ID),
            name,
        )
        .with_created_at(self.now()?);
        let api = self.repository.create_api(api).await?;

        self.cache.invalidate(CacheNamespace::ApiById, api.id()).await;
        info!(api_id = %api.id(), name = %api.name(), "Api created");

        Ok(api)
    }

    /// Looks up an api through the cache
    pub async fn find_api(&self, api_id: &str) -> Result<Option<Api>, DomainError> {
        let repository = self.repository.clone();
        let id = api_id.to_string();

        self.cache
            .swr(CacheNamespace::ApiById, api_id, move || async move {
                repository.get_api(&id).await
            })
            .await
    }

    /// Create a new key for an existing api
    pub async fn create(&self, request: CreateKeyRequest) -> Result<CreatedKey, DomainError> {
        validate_remaining(request.remaining)?;

        let expires = match request.expires {
            Some(millis) => {
                if millis <= self.clock.now_millis() {
                    return Err(DomainError::validation("expires must be in the future"));
                }
                Some(
                    DateTime::from_timestamp_millis(millis)
                        .ok_or_else(|| DomainError::validation("expires is out of range"))?,
                )
            }
            None => None,
        };

        let generated = generator::generate(
            request.byte_length.unwrap_or(DEFAULT_BYTE_LENGTH),
            request.prefix.as_deref(),
        )?;

        if self.find_api(&request.api_id).await?.is_none() {
            return Err(DomainError::not_found(format!(
                "Api '{}' not found",
                request.api_id
            )));
        }

        let mut key = Key::new(
            new_id(IdPrefix::Key),
            &request.api_id,
            &generated.hash,
            &generated.start,
        )
        .with_created_at(self.now()?)
        .with_meta(request.meta.unwrap_or_default())
        .with_remaining(request.remaining)
        .with_expires(expires);

        if let Some(owner_id) = request.owner_id {
            key = key.with_owner_id(owner_id);
        }
        if let Some(name) = request.name {
            key = key.with_name(name);
        }

        let key = self.repository.create(key).await?;
        info!(key_id = %key.id(), api_id = %key.api_id(), "Key created");

        Ok(CreatedKey {
            key_id: key.id().to_string(),
            key: generated.key,
        })
    }

    /// Verify a secret, consuming one use when the key is limited
    ///
    /// Unlimited keys may be answered from the cache. Limited keys always
    /// go through [`KeyRepository::consume`]. Store failures are returned
    /// as [`VerificationError::Store`] and never count as valid.
    pub async fn verify(
        &self,
        secret: &str,
        api_id: Option<&str>,
    ) -> Result<VerifiedKey, VerificationError> {
        let result = self.verify_inner(secret, api_id).await;

        let code = match &result {
            Ok(_) => VerificationCode::Valid,
            Err(e) => e.code(),
        };
        counter!("keygate_key_verifications_total", "outcome" => code.as_str()).increment(1);

        match &result {
            Ok(verified) => debug!(key_id = %verified.key_id, "Key verified"),
            Err(VerificationError::Store(e)) => warn!(error = %e, "Key verification failed closed"),
            Err(e) => debug!(code = code.as_str(), key_id = ?e.key_id(), "Key rejected"),
        }

        result
    }

    async fn verify_inner(
        &self,
        secret: &str,
        api_id: Option<&str>,
    ) -> Result<VerifiedKey, VerificationError> {
        let hash = generator::digest(secret);

        let repository = self.repository.clone();
        let lookup_hash = hash.clone();
        let cached: Option<Key> = self
            .cache
            .swr(CacheNamespace::KeyByHash, &hash, move || async move {
                repository.find_by_hash(&lookup_hash).await
            })
            .await?;

        let Some(cached) = cached else {
            return Err(VerificationError::NotFound);
        };

        if api_id.is_some_and(|api_id| api_id != cached.api_id()) {
            return Err(VerificationError::ApiMismatch {
                key_id: cached.id().to_string(),
            });
        }

        if cached.is_expired_at(self.clock.now_millis()) {
            return Err(VerificationError::Expired {
                key_id: cached.id().to_string(),
            });
        }

        if cached.is_unlimited() {
            return Ok(VerifiedKey::from_key(&cached));
        }

        match self.repository.consume(&hash).await? {
            ConsumeOutcome::NotFound => Err(VerificationError::NotFound),
            ConsumeOutcome::Unlimited(key) | ConsumeOutcome::Consumed(key) => {
                Ok(VerifiedKey::from_key(&key))
            }
            ConsumeOutcome::Exhausted(key) => Err(VerificationError::OutOfCredits {
                key_id: key.id().to_string(),
            }),
        }
    }

    /// Soft delete a key; deleting an already deleted key is a no-op
    pub async fn delete(&self, key_id: &str) -> Result<(), DomainError> {
        match self.repository.soft_delete(key_id, self.now()?).await? {
            DeleteOutcome::Deleted(key) => {
                self.cache.invalidate(CacheNamespace::KeyByHash, key.hash()).await;
                info!(key_id = %key_id, "Key deleted");
                Ok(())
            }
            DeleteOutcome::AlreadyDeleted(_) => {
                debug!(key_id = %key_id, "Key already deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(DomainError::not_found(format!(
                "Key '{}' not found",
                key_id
            ))),
        }
    }

    /// Change the remaining uses of a key, returning the new value
    pub async fn update_remaining(
        &self,
        key_id: &str,
        update: RemainingUpdate,
    ) -> Result<Option<i64>, DomainError> {
        let key = self.repository.update_remaining(key_id, update).await?;
        self.cache.invalidate(CacheNamespace::KeyByHash, key.hash()).await;

        info!(key_id = %key_id, remaining = ?key.remaining(), "Key remaining updated");
        Ok(key.remaining())
    }

    /// Get a live key by id
    pub async fn get(&self, key_id: &str) -> Result<Key, DomainError> {
        self.repository
            .get(key_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Key '{}' not found", key_id)))
    }
}
