//! Counter backend selection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::ratelimit::RatelimitCounter;
use crate::domain::{Clock, DomainError};

use super::memory_counter::InMemoryRatelimitCounter;
use super::redis_counter::RedisRatelimitCounter;

/// Supported counter backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterType {
    /// Counters live in this process only
    #[default]
    Memory,
    /// Counters shared through Redis
    Redis,
}

impl std::fmt::Display for CounterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterType::Memory => write!(f, "memory"),
            CounterType::Redis => write!(f, "redis"),
        }
    }
}

/// Creates the configured counter backend
pub async fn create_counter(
    counter_type: CounterType,
    redis_url: Option<&str>,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn RatelimitCounter>, DomainError> {
    match counter_type {
        CounterType::Memory => Ok(Arc::new(InMemoryRatelimitCounter::with_clock(clock))),
        CounterType::Redis => {
            let url = redis_url.ok_or_else(|| {
                DomainError::configuration("Redis URL is required for the redis counter backend")
            })?;
            Ok(Arc::new(RedisRatelimitCounter::new(url).await?))
        }
    }
}
