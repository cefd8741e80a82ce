//! Keygate
//!
//! An API key verification and rate limiting service:
//! - Keys stored as digests, with optional expiry and remaining uses
//! - Fixed-window rate limits with per-identifier overrides
//! - Stale-while-revalidate caching over memory or Redis
//! - In-memory or PostgreSQL persistence

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use domain::{CacheStore, Clock, RatelimitCounter, SystemClock};
use infrastructure::{
    cache::{CacheFactory, SwrCache},
    key::KeyService,
    ratelimit::{create_counter, RatelimitService},
    storage::{Repositories, StorageFactory},
};
use tracing::{info, warn};

/// Create the application state for a configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let storage_config = config.storage.to_storage_config()?;
    let repositories = StorageFactory::create(&storage_config).await?;
    info!(backend = %storage_config.storage_type(), "Storage initialized");

    let cache_config = config.cache.to_cache_config();
    let cache_store = CacheFactory::new()
        .create(&cache_config, clock.clone())
        .await?;
    info!(backend = cache_store.name(), "Cache initialized");

    let counter = create_counter(
        config.ratelimit.counter,
        config.ratelimit_redis_url(),
        clock.clone(),
    )
    .await?;
    info!(backend = counter.name(), "Rate limit counter initialized");

    if config.auth.root_keys.is_empty() {
        warn!("No root keys configured; management endpoints are unauthenticated");
    }

    Ok(build_app_state(
        repositories,
        cache_store,
        counter,
        clock,
        config.auth.root_keys.clone(),
    ))
}

/// Wire services over already constructed backends
pub fn build_app_state(
    repositories: Repositories,
    cache_store: Arc<dyn CacheStore>,
    counter: Arc<dyn RatelimitCounter>,
    clock: Arc<dyn Clock>,
    root_keys: Vec<String>,
) -> AppState {
    let cache = SwrCache::new(cache_store, clock.clone());

    let key_service = KeyService::new(repositories.keys, cache.clone(), clock.clone());
    let ratelimit_service = RatelimitService::new(repositories.ratelimits, counter, cache, clock);

    AppState::new(key_service, ratelimit_service, root_keys)
}
