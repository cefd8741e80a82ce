//! Rate limit service - window evaluation and override management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info, warn};

use crate::domain::cache::CacheNamespace;
use crate::domain::ratelimit::{
    find_matching_override, validate_duration, validate_identifier, LimitConfig, Page,
    RatelimitCounter, RatelimitNamespace, RatelimitOverride, RatelimitRepository,
    RatelimitRequest, RatelimitResponse, Window,
};
use crate::domain::{new_id, Clock, DomainError, IdPrefix};
use crate::infrastructure::cache::SwrCache;
use crate::infrastructure::key::DEFAULT_WORKSPACE_ID;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Largest page `list_overrides` returns
pub const MAX_PAGE_SIZE: usize = 100;

/// Input for creating or replacing an override
#[derive(Debug, Clone)]
pub struct SetOverrideRequest {
    pub namespace_id: String,
    pub identifier: String,
    pub limit: u64,
    /// Window length in milliseconds
    pub duration: u64,
    pub async_mode: bool,
}

/// Service evaluating rate limits against namespace overrides
#[derive(Debug, Clone)]
pub struct RatelimitService {
    repository: Arc<dyn RatelimitRepository>,
    counter: Arc<dyn RatelimitCounter>,
    cache: SwrCache,
    clock: Arc<dyn Clock>,
}

impl RatelimitService {
    pub fn new(
        repository: Arc<dyn RatelimitRepository>,
        counter: Arc<dyn RatelimitCounter>,
        cache: SwrCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            counter,
            cache,
            clock,
        }
    }

    async fn cached_namespace(&self, namespace_id: &str) -> Result<RatelimitNamespace, DomainError> {
        let repository = self.repository.clone();
        let id = namespace_id.to_string();

        self.cache
            .swr(CacheNamespace::RatelimitNamespace, namespace_id, move || async move {
                repository.get_namespace(&id).await
            })
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Namespace '{}' not found", namespace_id)))
    }

    async fn cached_overrides(&self, namespace_id: &str) -> Result<Vec<RatelimitOverride>, DomainError> {
        let repository = self.repository.clone();
        let id = namespace_id.to_string();

        self.cache
            .swr(CacheNamespace::RatelimitOverrides, namespace_id, move || async move {
                repository.all_overrides(&id).await
            })
            .await
    }

    /// Resolves the limit that applies to the request's identifier
    pub async fn resolve_limit(&self, request: &RatelimitRequest) -> Result<LimitConfig, DomainError> {
        let overrides = self.cached_overrides(&request.namespace_id).await?;

        Ok(find_matching_override(&overrides, &request.identifier)
            .map(LimitConfig::from)
            .unwrap_or_else(|| request.default_limit()))
    }

    /// Evaluates one rate limit check
    ///
    /// Synchronous checks respond after the counter increment completes.
    /// Async checks answer from the current count and apply the increment
    /// in a background task, which may let a bounded burst through.
    pub async fn check(&self, request: RatelimitRequest) -> Result<RatelimitResponse, DomainError> {
        request.validate()?;
        self.cached_namespace(&request.namespace_id).await?;

        let config = self.resolve_limit(&request).await?;
        validate_duration(config.duration)?;

        let window = Window::at(self.clock.now_millis(), config.duration);
        let counter_key = window.counter_key(&request.namespace_id, &request.identifier, config.duration);

        let used = if request.cost == 0 {
            self.counter.current(&counter_key).await?
        } else if config.async_mode {
            let current = self.counter.current(&counter_key).await?;
            self.spawn_increment(counter_key, request.cost, window.reset_at);
            current.saturating_add(request.cost)
        } else {
            self.counter
                .increment(&counter_key, request.cost, window.reset_at)
                .await?
        };

        let response = RatelimitResponse {
            success: used <= config.limit,
            limit: config.limit,
            remaining: config.limit.saturating_sub(used),
            reset_at: window.reset_at,
        };

        let outcome = if response.success { "allowed" } else { "denied" };
        counter!("keygate_ratelimit_checks_total", "outcome" => outcome).increment(1);
        debug!(
            namespace_id = %request.namespace_id,
            identifier = %request.identifier,
            outcome,
            remaining = response.remaining,
            "Rate limit checked"
        );

        Ok(response)
    }

    fn spawn_increment(&self, counter_key: String, cost: u64, expires_at: i64) {
        let counter = self.counter.clone();

        tokio::spawn(async move {
            if let Err(e) = counter.increment(&counter_key, cost, expires_at).await {
                warn!(key = %counter_key, backend = counter.name(), error = %e, "Async rate limit increment failed");
            }
        });
    }

    fn now(&self) -> Result<DateTime<Utc>, DomainError> {
        DateTime::from_timestamp_millis(self.clock.now_millis())
            .ok_or_else(|| DomainError::internal("clock is out of range"))
    }

    /// Create a namespace
    pub async fn create_namespace(
        &self,
        name: &str,
        workspace_id: Option<&str>,
    ) -> Result<RatelimitNamespace, DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::validation("name must not be empty"));
        }

        let namespace = RatelimitNamespace::new(
            new_id(IdPrefix::RatelimitNamespace),
            workspace_id.unwrap_or(DEFAULT_WORKSPACE_ID),
            name,
        )
        .with_created_at(self.now()?);
        let namespace = self.repository.create_namespace(namespace).await?;

        self.cache
            .invalidate(CacheNamespace::RatelimitNamespace, namespace.id())
            .await;
        info!(namespace_id = %namespace.id(), name = %namespace.name(), "Namespace created");

        Ok(namespace)
    }

    /// Create or replace the override for an identifier
    pub async fn set_override(
        &self,
        request: SetOverrideRequest,
    ) -> Result<RatelimitOverride, DomainError> {
        validate_identifier(&request.identifier)?;
        validate_duration(request.duration)?;
        self.cached_namespace(&request.namespace_id).await?;

        let ratelimit_override = RatelimitOverride::new(
            new_id(IdPrefix::RatelimitOverride),
            &request.namespace_id,
            &request.identifier,
            request.limit,
            request.duration,
        )
        .with_async(request.async_mode)
        .with_created_at(self.now()?);

        let stored = self.repository.upsert_override(ratelimit_override).await?;
        self.cache
            .invalidate(CacheNamespace::RatelimitOverrides, &request.namespace_id)
            .await;

        info!(
            namespace_id = %request.namespace_id,
            identifier = %request.identifier,
            override_id = %stored.id(),
            "Override set"
        );
        Ok(stored)
    }

    /// Get the override stored for exactly `identifier`
    pub async fn get_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<RatelimitOverride, DomainError> {
        self.cached_namespace(namespace_id).await?;

        self.repository
            .get_override(namespace_id, identifier)
            .await?
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "Override for '{}' not found in namespace '{}'",
                    identifier, namespace_id
                ))
            })
    }

    /// Delete the override for `identifier`
    pub async fn delete_override(&self, namespace_id: &str, identifier: &str) -> Result<(), DomainError> {
        self.cached_namespace(namespace_id).await?;

        if !self.repository.delete_override(namespace_id, identifier).await? {
            return Err(DomainError::not_found(format!(
                "Override for '{}' not found in namespace '{}'",
                identifier, namespace_id
            )));
        }

        self.cache
            .invalidate(CacheNamespace::RatelimitOverrides, namespace_id)
            .await;
        info!(namespace_id = %namespace_id, identifier = %identifier, "Override deleted");

        Ok(())
    }

    /// One page of a namespace's overrides, read from the store
    pub async fn list_overrides(
        &self,
        namespace_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Result<Page<RatelimitOverride>, DomainError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 {
            return Err(DomainError::validation("limit must be greater than 0"));
        }

        self.cached_namespace(namespace_id).await?;
        self.repository
            .list_overrides(namespace_id, limit.min(MAX_PAGE_SIZE), cursor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ratelimit::MAX_DURATION;
    use crate::domain::ManualClock;
    use crate::infrastructure::cache::{InMemoryCacheConfig, InMemoryCacheStore};
    use crate::infrastructure::ratelimit::{InMemoryRatelimitCounter, InMemoryRatelimitRepository};

    const NOW: i64 = 1_700_000_030_000;

    fn service() -> (RatelimitService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = Arc::new(InMemoryCacheStore::with_config(
            InMemoryCacheConfig::default(),
            clock.clone(),
        ));
        let service = RatelimitService::new(
            Arc::new(InMemoryRatelimitRepository::new()),
            Arc::new(InMemoryRatelimitCounter::with_clock(clock.clone())),
            SwrCache::new(store, clock.clone()),
            clock.clone(),
        );
        (service, clock)
    }

    async fn namespace(service: &RatelimitService) -> String {
        service
            .create_namespace("api.requests", None)
            .await
            .unwrap()
            .id()
            .to_string()
    }

    fn set_override(namespace_id: &str, identifier: &str, limit: u64) -> SetOverrideRequest {
        SetOverrideRequest {
            namespace_id: namespace_id.to_string(),
            identifier: identifier.to_string(),
            limit,
            duration: 60_000,
            async_mode: false,
        }
    }

    #[tokio::test]
    async fn test_created_at_comes_from_clock() {
        let (service, clock) = service();
        clock.advance(2_000);

        let created = service.create_namespace("api.requests", None).await.unwrap();
        assert_eq!(created.created_at().timestamp_millis(), NOW + 2_000);

        let stored = service
            .set_override(set_override(created.id(), "u", 1))
            .await
            .unwrap();
        assert_eq!(stored.created_at().timestamp_millis(), NOW + 2_000);
    }

    #[tokio::test]
    async fn test_fixed_window_allows_limit_then_denies() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        let mut responses = Vec::new();
        for _ in 0..10 {
            let request = RatelimitRequest::new(&ns, "user_1", 5, 60_000);
            responses.push(service.check(request).await.unwrap());
        }

        assert!(responses[..5].iter().all(|r| r.success));
        assert!(responses[5..].iter().all(|r| !r.success));
        assert_eq!(responses[0].remaining, 4);
        assert_eq!(responses[4].remaining, 0);

        let reset_at = responses[0].reset_at;
        assert!(responses.iter().all(|r| r.reset_at == reset_at));
        assert_eq!(reset_at, 1_700_000_040_000);
    }

    #[tokio::test]
    async fn test_new_window_resets_counter() {
        let (service, clock) = service();
        let ns = namespace(&service).await;
        let request = || RatelimitRequest::new(&ns, "user_1", 1, 1_000);

        assert!(service.check(request()).await.unwrap().success);
        assert!(!service.check(request()).await.unwrap().success);

        clock.advance(1_000);
        assert!(service.check(request()).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_override_takes_precedence() {
        let (service, _) = service();
        let ns = namespace(&service).await;
        service.set_override(set_override(&ns, "user_42", 1)).await.unwrap();

        let check = |identifier: &str| {
            service.check(RatelimitRequest::new(&ns, identifier, 100, 60_000))
        };

        let first = check("user_42").await.unwrap();
        assert!(first.success);
        assert_eq!(first.limit, 1);
        assert!(!check("user_42").await.unwrap().success);

        let other = check("user_43").await.unwrap();
        assert!(other.success);
        assert_eq!(other.limit, 100);
        assert!(check("user_43").await.unwrap().success);
    }

    #[tokio::test]
    async fn test_wildcard_override() {
        let (service, _) = service();
        let ns = namespace(&service).await;
        service.set_override(set_override(&ns, "user_*", 7)).await.unwrap();
        service.set_override(set_override(&ns, "user_42", 1)).await.unwrap();

        let limit = |identifier: &'static str| {
            let request = RatelimitRequest::new(&ns, identifier, 100, 60_000);
            let service = service.clone();
            async move { service.check(request).await.unwrap().limit }
        };

        assert_eq!(limit("user_42").await, 1);
        assert_eq!(limit("user_7").await, 7);
        assert_eq!(limit("admin").await, 100);
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let (service, _) = service();

        let result = service
            .check(RatelimitRequest::new("rlns_missing", "user_1", 5, 1_000))
            .await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_empty_identifier() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        let result = service.check(RatelimitRequest::new(&ns, "", 5, 1_000)).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_duration_out_of_range_is_bad_request() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        for _ in 0..3 {
            let result = service.check(RatelimitRequest::new(&ns, "u", 1, u64::MAX)).await;
            assert!(matches!(result, Err(DomainError::Validation { .. })));
        }

        let mut request = set_override(&ns, "u", 1);
        request.duration = u64::MAX;
        let result = service.set_override(request).await;
        assert!(matches!(result, Err(DomainError::Validation { .. })));

        let allowed = service
            .check(RatelimitRequest::new(&ns, "u", 1, MAX_DURATION))
            .await
            .unwrap();
        assert!(allowed.success);
        assert!(allowed.reset_at > NOW);

        let denied = service
            .check(RatelimitRequest::new(&ns, "u", 1, MAX_DURATION))
            .await
            .unwrap();
        assert!(!denied.success);
    }

    #[tokio::test]
    async fn test_zero_cost_peeks() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        service.check(RatelimitRequest::new(&ns, "u", 3, 60_000)).await.unwrap();

        let peek = service
            .check(RatelimitRequest::new(&ns, "u", 3, 60_000).with_cost(0))
            .await
            .unwrap();
        assert!(peek.success);
        assert_eq!(peek.remaining, 2);

        let next = service.check(RatelimitRequest::new(&ns, "u", 3, 60_000)).await.unwrap();
        assert_eq!(next.remaining, 1);
    }

    #[tokio::test]
    async fn test_cost_larger_than_limit() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        let response = service
            .check(RatelimitRequest::new(&ns, "u", 3, 60_000).with_cost(4))
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.remaining, 0);
    }

    #[tokio::test]
    async fn test_async_mode_applies_increment_in_background() {
        let (service, _) = service();
        let ns = namespace(&service).await;
        let request = || RatelimitRequest::new(&ns, "u", 2, 60_000).with_async(true);

        assert!(service.check(request()).await.unwrap().success);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(service.check(request()).await.unwrap().success);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!service.check(request()).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_override_changes_are_visible_immediately() {
        let (service, _) = service();
        let ns = namespace(&service).await;
        let request = || RatelimitRequest::new(&ns, "user_1", 100, 60_000);

        assert_eq!(service.check(request()).await.unwrap().limit, 100);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        service.set_override(set_override(&ns, "user_1", 3)).await.unwrap();
        assert_eq!(service.check(request()).await.unwrap().limit, 3);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        service.delete_override(&ns, "user_1").await.unwrap();
        assert_eq!(service.check(request()).await.unwrap().limit, 100);
    }

    #[tokio::test]
    async fn test_override_management() {
        let (service, _) = service();
        let ns = namespace(&service).await;

        let first = service.set_override(set_override(&ns, "a", 1)).await.unwrap();
        let replaced = service.set_override(set_override(&ns, "a", 2)).await.unwrap();
        assert_eq!(first.id(), replaced.id());

        assert_eq!(service.get_override(&ns, "a").await.unwrap().limit(), 2);
        assert!(matches!(
            service.get_override(&ns, "b").await,
            Err(DomainError::NotFound { .. })
        ));

        service.delete_override(&ns, "a").await.unwrap();
        assert!(matches!(
            service.delete_override(&ns, "a").await,
            Err(DomainError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_overrides() {
        let (service, _) = service();
        let ns = namespace(&service).await;
        for identifier in ["a", "b", "c"] {
            service.set_override(set_override(&ns, identifier, 1)).await.unwrap();
        }

        let page = service.list_overrides(&ns, Some(2), None).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);

        let rest = service
            .list_overrides(&ns, None, page.cursor.as_deref())
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(rest.cursor.is_none());

        assert!(service.list_overrides(&ns, Some(0), None).await.is_err());
        assert!(matches!(
            service.list_overrides("rlns_missing", None, None).await,
            Err(DomainError::NotFound { .. })
        ));
    }
}
