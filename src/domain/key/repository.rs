//! Key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{Api, ConsumeOutcome, DeleteOutcome, Key, RemainingUpdate};
use crate::domain::DomainError;

/// Durable store for apis and keys
///
/// Implementations must serialize [`KeyRepository::consume`] per key row:
/// concurrent calls for the same hash never drive `remaining` below zero
/// and never spend the same use twice.
#[async_trait]
pub trait KeyRepository: Send + Sync + Debug {
    /// Get an api by id
    async fn get_api(&self, id: &str) -> Result<Option<Api>, DomainError>;

    /// Create a new api
    async fn create_api(&self, api: Api) -> Result<Api, DomainError>;

    /// Create a new key
    async fn create(&self, key: Key) -> Result<Key, DomainError>;

    /// Get a live (not deleted) key by id
    async fn get(&self, id: &str) -> Result<Option<Key>, DomainError>;

    /// Get a live key by its hash
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError>;

    /// Look up a live key by hash and consume one use in the same atomic step
    async fn consume(&self, hash: &str) -> Result<ConsumeOutcome, DomainError>;

    /// Change the remaining uses of a live key
    async fn update_remaining(&self, id: &str, update: RemainingUpdate)
        -> Result<Key, DomainError>;

    /// Soft delete a key, stamping `deleted_at`
    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<DeleteOutcome, DomainError>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
