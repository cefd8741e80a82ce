use serde::Deserialize;

use crate::infrastructure::cache::{CacheConfig, CacheType};
use crate::infrastructure::ratelimit::CounterType;
use crate::infrastructure::storage::{PostgresConfig, StorageConfig, StorageType};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub ratelimit: RatelimitSettings,
    pub auth: AuthConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageType,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheType,
    pub redis_url: Option<String>,
    pub key_prefix: Option<String>,
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RatelimitSettings {
    pub counter: CounterType,
    pub redis_url: Option<String>,
}

/// Root keys allowed to call management endpoints
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Digests (`keygate hash <secret>`) of accepted root keys; empty
    /// disables the check
    pub root_keys: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageType::Memory,
            database_url: None,
            max_connections: 10,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheType::Memory,
            redis_url: None,
            key_prefix: Some("keygate".to_string()),
            max_capacity: 10_000,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl StorageSettings {
    pub fn to_storage_config(&self) -> Result<StorageConfig, config::ConfigError> {
        match self.backend {
            StorageType::Memory => Ok(StorageConfig::Memory),
            StorageType::Postgres => {
                let url = self.database_url.clone().ok_or_else(|| {
                    config::ConfigError::Message(
                        "storage.database_url is required for the postgres backend".to_string(),
                    )
                })?;
                Ok(StorageConfig::Postgres(
                    PostgresConfig::new(url).with_max_connections(self.max_connections),
                ))
            }
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            cache_type: self.backend,
            redis_url: self.redis_url.clone(),
            key_prefix: self.key_prefix.clone(),
            max_capacity: self.max_capacity,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.root_keys"),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Checks settings that depend on each other
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        self.storage.to_storage_config()?;

        if self.cache.backend == CacheType::Redis && self.cache.redis_url.is_none() {
            return Err(config::ConfigError::Message(
                "cache.redis_url is required for the redis cache backend".to_string(),
            ));
        }

        if self.ratelimit.counter == CounterType::Redis
            && self.ratelimit.redis_url.is_none()
            && self.cache.redis_url.is_none()
        {
            return Err(config::ConfigError::Message(
                "ratelimit.redis_url is required for the redis counter backend".to_string(),
            ));
        }

        Ok(())
    }

    /// Redis URL for counters, falling back to the cache's
    pub fn ratelimit_redis_url(&self) -> Option<&str> {
        self.ratelimit
            .redis_url
            .as_deref()
            .or(self.cache.redis_url.as_deref())
    }
}
