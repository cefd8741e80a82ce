//! In-memory rate limit repository implementation

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::ratelimit::{Page, RatelimitNamespace, RatelimitOverride, RatelimitRepository};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct State {
    namespaces: HashMap<String, RatelimitNamespace>,
    /// Keyed by override id
    overrides: HashMap<String, RatelimitOverride>,
}

impl State {
    fn overrides_of(&self, namespace_id: &str) -> Vec<&RatelimitOverride> {
        let mut overrides: Vec<_> = self
            .overrides
            .values()
            .filter(|o| o.namespace_id() == namespace_id)
            .collect();
        overrides.sort_by(|a, b| a.id().cmp(b.id()));
        overrides
    }

    fn find_override(&self, namespace_id: &str, identifier: &str) -> Option<&RatelimitOverride> {
        self.overrides
            .values()
            .find(|o| o.namespace_id() == namespace_id && o.identifier() == identifier)
    }
}

/// In-memory implementation of [`RatelimitRepository`]
#[derive(Debug, Default)]
pub struct InMemoryRatelimitRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryRatelimitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RatelimitRepository for InMemoryRatelimitRepository {
    async fn get_namespace(&self, id: &str) -> Result<Option<RatelimitNamespace>, DomainError> {
        let state = self.state.read().await;
        Ok(state.namespaces.get(id).cloned())
    }

    async fn create_namespace(
        &self,
        namespace: RatelimitNamespace,
    ) -> Result<RatelimitNamespace, DomainError> {
        let mut state = self.state.write().await;

        let duplicate = state.namespaces.values().any(|n| {
            n.id() == namespace.id()
                || (n.workspace_id() == namespace.workspace_id() && n.name() == namespace.name())
        });

        if duplicate {
            return Err(DomainError::conflict(format!(
                "Namespace '{}' already exists",
                namespace.name()
            )));
        }

        state
            .namespaces
            .insert(namespace.id().to_string(), namespace.clone());
        Ok(namespace)
    }

    async fn all_overrides(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<RatelimitOverride>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .overrides_of(namespace_id)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn list_overrides(
        &self,
        namespace_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<RatelimitOverride>, DomainError> {
        let state = self.state.read().await;
        let all = state.overrides_of(namespace_id);
        let total = all.len();

        let mut after_cursor = all
            .into_iter()
            .filter(|o| cursor.is_none_or(|c| o.id() > c))
            .peekable();

        let items: Vec<RatelimitOverride> = after_cursor.by_ref().take(limit).cloned().collect();
        let cursor = match after_cursor.peek() {
            Some(_) => items.last().map(|o| o.id().to_string()),
            None => None,
        };

        Ok(Page {
            items,
            cursor,
            total,
        })
    }

    async fn get_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<Option<RatelimitOverride>, DomainError> {
        let state = self.state.read().await;
        Ok(state.find_override(namespace_id, identifier).cloned())
    }

    async fn upsert_override(
        &self,
        ratelimit_override: RatelimitOverride,
    ) -> Result<RatelimitOverride, DomainError> {
        let mut state = self.state.write().await;

        let existing_id = state
            .find_override(ratelimit_override.namespace_id(), ratelimit_override.identifier())
            .map(|o| (o.id().to_string(), o.created_at()));

        let stored = match existing_id {
            Some((id, created_at)) => RatelimitOverride::new(
                id,
                ratelimit_override.namespace_id(),
                ratelimit_override.identifier(),
                ratelimit_override.limit(),
                ratelimit_override.duration(),
            )
            .with_async(ratelimit_override.is_async())
            .with_created_at(created_at),
            None => ratelimit_override,
        };

        state
            .overrides
            .insert(stored.id().to_string(), stored.clone());
        Ok(stored)
    }

    async fn delete_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;

        let id = state
            .find_override(namespace_id, identifier)
            .map(|o| o.id().to_string());

        Ok(match id {
            Some(id) => state.overrides.remove(&id).is_some(),
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ov(id: &str, identifier: &str) -> RatelimitOverride {
        RatelimitOverride::new(id, "rlns_1", identifier, 10, 60_000)
    }

    #[tokio::test]
    async fn test_namespace_name_unique_per_workspace() {
        let repo = InMemoryRatelimitRepository::new();
        repo.create_namespace(RatelimitNamespace::new("rlns_1", "ws_1", "api"))
            .await
            .unwrap();

        let dup = repo
            .create_namespace(RatelimitNamespace::new("rlns_2", "ws_1", "api"))
            .await;
        assert!(matches!(dup, Err(DomainError::Conflict { .. })));

        repo.create_namespace(RatelimitNamespace::new("rlns_3", "ws_2", "api"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_upsert_keeps_id() {
        let repo = InMemoryRatelimitRepository::new();
        repo.upsert_override(ov("rlor_a", "user_1")).await.unwrap();

        let updated = repo
            .upsert_override(RatelimitOverride::new("rlor_b", "rlns_1", "user_1", 3, 1_000))
            .await
            .unwrap();

        assert_eq!(updated.id(), "rlor_a");
        assert_eq!(updated.limit(), 3);
        assert_eq!(repo.all_overrides("rlns_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_overrides_paginates() {
        let repo = InMemoryRatelimitRepository::new();
        for (id, identifier) in [("rlor_a", "u1"), ("rlor_b", "u2"), ("rlor_c", "u3")] {
            repo.upsert_override(ov(id, identifier)).await.unwrap();
        }

        let first = repo.list_overrides("rlns_1", 2, None).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.cursor.as_deref(), Some("rlor_b"));

        let second = repo
            .list_overrides("rlns_1", 2, first.cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].id(), "rlor_c");
        assert!(second.cursor.is_none());
    }

    #[tokio::test]
    async fn test_get_and_delete_override() {
        let repo = InMemoryRatelimitRepository::new();
        repo.upsert_override(ov("rlor_a", "user_1")).await.unwrap();

        assert!(repo.get_override("rlns_1", "user_1").await.unwrap().is_some());
        assert!(repo.delete_override("rlns_1", "user_1").await.unwrap());
        assert!(!repo.delete_override("rlns_1", "user_1").await.unwrap());
        assert!(repo.get_override("rlns_1", "user_1").await.unwrap().is_none());
    }
}
