//! Rate limit repository and counter traits

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{Page, RatelimitNamespace, RatelimitOverride};
use crate::domain::DomainError;

/// Durable store for namespaces and overrides
#[async_trait]
pub trait RatelimitRepository: Send + Sync + Debug {
    /// Get a namespace by id
    async fn get_namespace(&self, id: &str) -> Result<Option<RatelimitNamespace>, DomainError>;

    /// Create a namespace; names are unique per workspace
    async fn create_namespace(
        &self,
        namespace: RatelimitNamespace,
    ) -> Result<RatelimitNamespace, DomainError>;

    /// All overrides of a namespace, ordered by id
    async fn all_overrides(&self, namespace_id: &str)
        -> Result<Vec<RatelimitOverride>, DomainError>;

    /// One page of overrides, starting after `cursor` (an override id)
    async fn list_overrides(
        &self,
        namespace_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<RatelimitOverride>, DomainError>;

    /// Get the override stored for exactly `identifier`
    async fn get_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<Option<RatelimitOverride>, DomainError>;

    /// Insert or replace the override for `(namespace_id, identifier)`
    ///
    /// An existing row keeps its id.
    async fn upsert_override(
        &self,
        ratelimit_override: RatelimitOverride,
    ) -> Result<RatelimitOverride, DomainError>;

    /// Delete an override, returning whether it existed
    async fn delete_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<bool, DomainError>;
}

/// Atomic per-window counters
///
/// `increment` must be atomic in the backing store; concurrent increments
/// of the same key are never lost.
#[async_trait]
pub trait RatelimitCounter: Send + Sync + Debug {
    /// Short name of the backend, used in logs
    fn name(&self) -> &'static str;

    /// Adds `cost` and returns the new total; the counter expires at
    /// `expires_at` (unix millis)
    async fn increment(&self, key: &str, cost: u64, expires_at: i64) -> Result<u64, DomainError>;

    /// Current total without modifying it
    async fn current(&self, key: &str) -> Result<u64, DomainError>;
}
