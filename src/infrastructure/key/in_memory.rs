//! In-memory key repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::key::{
    Api, ConsumeOutcome, DeleteOutcome, Key, KeyRepository, RemainingUpdate,
};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct State {
    apis: HashMap<String, Api>,
    keys: HashMap<String, Key>,
    /// hash -> key id, live keys only
    hash_index: HashMap<String, String>,
}

/// In-memory implementation of [`KeyRepository`]
///
/// A single lock guards all maps, so `consume` is one atomic step.
#[derive(Debug, Default)]
pub struct InMemoryKeyRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyRepository for InMemoryKeyRepository {
    async fn get_api(&self, id: &str) -> Result<Option<Api>, DomainError> {
        let state = self.state.read().await;
        Ok(state.apis.get(id).cloned())
    }

    async fn create_api(&self, api: Api) -> Result<Api, DomainError> {
        let mut state = self.state.write().await;

        if state.apis.contains_key(api.id()) {
            return Err(DomainError::conflict(format!(
                "Api '{}' already exists",
                api.id()
            )));
        }

        state.apis.insert(api.id().to_string(), api.clone());
        Ok(api)
    }

    async fn create(&self, key: Key) -> Result<Key, DomainError> {
        let mut state = self.state.write().await;

        if state.keys.contains_key(key.id()) {
            return Err(DomainError::conflict(format!(
                "Key '{}' already exists",
                key.id()
            )));
        }

        if state.hash_index.contains_key(key.hash()) {
            return Err(DomainError::conflict("Key with the same hash already exists"));
        }

        state
            .hash_index
            .insert(key.hash().to_string(), key.id().to_string());
        state.keys.insert(key.id().to_string(), key.clone());

        Ok(key)
    }

    async fn get(&self, id: &str) -> Result<Option<Key>, DomainError> {
        let state = self.state.read().await;
        Ok(state.keys.get(id).filter(|k| !k.is_deleted()).cloned())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError> {
        let state = self.state.read().await;

        Ok(state
            .hash_index
            .get(hash)
            .and_then(|id| state.keys.get(id))
            .filter(|k| !k.is_deleted())
            .cloned())
    }

    async fn consume(&self, hash: &str) -> Result<ConsumeOutcome, DomainError> {
        let mut state = self.state.write().await;

        let Some(id) = state.hash_index.get(hash).cloned() else {
            return Ok(ConsumeOutcome::NotFound);
        };

        let Some(key) = state.keys.get_mut(&id).filter(|k| !k.is_deleted()) else {
            return Ok(ConsumeOutcome::NotFound);
        };

        match key.remaining() {
            None => Ok(ConsumeOutcome::Unlimited(key.clone())),
            Some(remaining) if remaining <= 0 => Ok(ConsumeOutcome::Exhausted(key.clone())),
            Some(_) => {
                key.apply_remaining(RemainingUpdate::Decrement(1))?;
                Ok(ConsumeOutcome::Consumed(key.clone()))
            }
        }
    }

    async fn update_remaining(
        &self,
        id: &str,
        update: RemainingUpdate,
    ) -> Result<Key, DomainError> {
        let mut state = self.state.write().await;

        let key = state
            .keys
            .get_mut(id)
            .filter(|k| !k.is_deleted())
            .ok_or_else(|| DomainError::not_found(format!("Key '{}' not found", id)))?;

        key.apply_remaining(update)?;
        Ok(key.clone())
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<DeleteOutcome, DomainError> {
        let mut state = self.state.write().await;

        let Some(key) = state.keys.get_mut(id) else {
            return Ok(DeleteOutcome::NotFound);
        };

        if !key.mark_deleted(deleted_at) {
            return Ok(DeleteOutcome::AlreadyDeleted(key.clone()));
        }

        let key = key.clone();
        state.hash_index.remove(key.hash());
        Ok(DeleteOutcome::Deleted(key))
    }
}
