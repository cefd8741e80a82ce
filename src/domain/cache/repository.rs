//! Cache store trait definition

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use super::entry::{CacheEntry, CacheNamespace};
use crate::domain::DomainError;

/// Backing store for cache entries
///
/// Values are JSON strings so the trait stays dyn-compatible. Stores are
/// responsible for dropping entries once `expires_at` (unix millis) has
/// passed; the SWR layer passes an entry's `stale_until` here.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Short name of the backend, used in logs
    fn name(&self) -> &'static str;

    /// Gets a raw JSON value
    async fn get_raw(&self, key: &str) -> Result<Option<String>, DomainError>;

    /// Stores a raw JSON value until `expires_at`
    async fn set_raw(&self, key: &str, value: &str, expires_at: i64) -> Result<(), DomainError>;

    /// Removes a value, returning whether it existed
    async fn remove(&self, key: &str) -> Result<bool, DomainError>;
}

/// Typed entry access on top of [`CacheStore`]
pub trait CacheStoreExt: CacheStore {
    fn get_entry<'a, V>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<Option<CacheEntry<V>>, DomainError>> + Send
    where
        V: DeserializeOwned + Send,
    {
        async move {
            match self.get_raw(&namespace.key(key)).await? {
                Some(data) => {
                    let entry: CacheEntry<V> = serde_json::from_str(&data).map_err(|e| {
                        DomainError::cache(format!("Failed to deserialize cache entry: {}", e))
                    })?;
                    Ok(Some(entry))
                }
                None => Ok(None),
            }
        }
    }

    fn set_entry<'a, V>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a str,
        entry: &'a CacheEntry<V>,
    ) -> impl std::future::Future<Output = Result<(), DomainError>> + Send
    where
        V: Serialize + Send + Sync,
    {
        async move {
            let data = serde_json::to_string(entry).map_err(|e| {
                DomainError::cache(format!("Failed to serialize cache entry: {}", e))
            })?;
            self.set_raw(&namespace.key(key), &data, entry.stale_until)
                .await
        }
    }

    fn remove_entry<'a>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a str,
    ) -> impl std::future::Future<Output = Result<bool, DomainError>> + Send {
        async move { self.remove(&namespace.key(key)).await }
    }
}

impl<T: CacheStore + ?Sized> CacheStoreExt for T {}
