//! Redis window counters

use std::fmt;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::domain::ratelimit::RatelimitCounter;
use crate::domain::DomainError;

/// Prefix applied to every counter key
const COUNTER_KEY_PREFIX: &str = "ratelimit";

/// Counters shared between instances through Redis
///
/// `INCRBY` and `PEXPIREAT` run in one `MULTI`/`EXEC` block, so a counter
/// never outlives its window.
#[derive(Clone)]
pub struct RedisRatelimitCounter {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisRatelimitCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisRatelimitCounter")
            .field("connection", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisRatelimitCounter {
    pub async fn new(url: &str) -> Result<Self, DomainError> {
        let client = Client::open(url)
            .map_err(|e| DomainError::internal(format!("Failed to create Redis client: {}", e)))?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| DomainError::internal(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self { connection })
    }
}

fn counter_key(key: &str) -> String {
    format!("{}:{}", COUNTER_KEY_PREFIX, key)
}

#[async_trait]
impl RatelimitCounter for RedisRatelimitCounter {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn increment(&self, key: &str, cost: u64, expires_at: i64) -> Result<u64, DomainError> {
        let key = counter_key(key);
        let mut conn = self.connection.clone();

        let (total,): (u64,) = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(&key)
            .arg(cost)
            .cmd("PEXPIREAT")
            .arg(&key)
            .arg(expires_at)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| DomainError::internal(format!("Failed to increment counter '{}': {}", key, e)))?;

        Ok(total)
    }

    async fn current(&self, key: &str) -> Result<u64, DomainError> {
        let key = counter_key(key);
        let mut conn = self.connection.clone();

        let value: Option<u64> = conn
            .get(&key)
            .await
            .map_err(|e| DomainError::internal(format!("Failed to read counter '{}': {}", key, e)))?;

        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "Requires running Redis instance"]
    async fn test_redis_increment() {
        let counter = RedisRatelimitCounter::new("redis://127.0.0.1:6379").await.unwrap();
        let key = crate::domain::new_id(crate::domain::IdPrefix::RatelimitNamespace);
        let expires_at = chrono::Utc::now().timestamp_millis() + 60_000;

        assert_eq!(counter.increment(&key, 2, expires_at).await.unwrap(), 2);
        assert_eq!(counter.increment(&key, 1, expires_at).await.unwrap(), 3);
        assert_eq!(counter.current(&key).await.unwrap(), 3);
    }

    #[test]
    fn test_counter_key() {
        assert_eq!(counter_key("rlns_1:user:1000:7"), "ratelimit:rlns_1:user:1000:7");
    }
}
