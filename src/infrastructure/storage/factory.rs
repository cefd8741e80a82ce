//! Storage factory for runtime backend selection

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::key::KeyRepository;
use crate::domain::ratelimit::RatelimitRepository;
use crate::domain::DomainError;
use crate::infrastructure::key::{InMemoryKeyRepository, PostgresKeyRepository};
use crate::infrastructure::ratelimit::{InMemoryRatelimitRepository, PostgresRatelimitRepository};

use super::postgres::{connect_pool, PostgresConfig};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// In-memory storage (for testing/development)
    #[default]
    #[serde(alias = "in_memory", alias = "inmemory")]
    Memory,
    /// PostgreSQL storage
    #[serde(alias = "postgresql", alias = "pg")]
    Postgres,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => write!(f, "memory"),
            StorageType::Postgres => write!(f, "postgres"),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone)]
pub enum StorageConfig {
    Memory,
    Postgres(PostgresConfig),
}

impl StorageConfig {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::Memory => StorageType::Memory,
            Self::Postgres(_) => StorageType::Postgres,
        }
    }
}

/// Durable repositories sharing one backend
#[derive(Debug, Clone)]
pub struct Repositories {
    pub keys: Arc<dyn KeyRepository>,
    pub ratelimits: Arc<dyn RatelimitRepository>,
}

/// Factory for creating repositories
#[derive(Debug)]
pub struct StorageFactory;

impl StorageFactory {
    /// Creates the repositories for the configured backend
    pub async fn create(config: &StorageConfig) -> Result<Repositories, DomainError> {
        match config {
            StorageConfig::Memory => Ok(Self::in_memory()),
            StorageConfig::Postgres(pg_config) => {
                let pool = connect_pool(pg_config).await?;

                Ok(Repositories {
                    keys: Arc::new(PostgresKeyRepository::new(pool.clone())),
                    ratelimits: Arc::new(PostgresRatelimitRepository::new(pool)),
                })
            }
        }
    }

    /// Creates empty in-memory repositories
    pub fn in_memory() -> Repositories {
        Repositories {
            keys: Arc::new(InMemoryKeyRepository::new()),
            ratelimits: Arc::new(InMemoryRatelimitRepository::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_type_deserialize() {
        let t: StorageType = serde_json::from_str("\"pg\"").unwrap();
        assert_eq!(t, StorageType::Postgres);
        let t: StorageType = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(t, StorageType::Memory);
    }

    #[tokio::test]
    async fn test_create_memory() {
        let repositories = StorageFactory::create(&StorageConfig::Memory).await.unwrap();
        assert!(repositories.keys.get("key_missing").await.unwrap().is_none());
        assert!(repositories
            .ratelimits
            .get_namespace("rlns_missing")
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_storage_config_type() {
        assert_eq!(StorageConfig::Memory.storage_type(), StorageType::Memory);
        assert_eq!(
            StorageConfig::Postgres(PostgresConfig::default()).storage_type(),
            StorageType::Postgres
        );
    }
}
