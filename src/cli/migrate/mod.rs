//! Migrate command - applies the PostgreSQL schema

use anyhow::bail;
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::storage::{
    connect_pool, run_storage_migrations, PostgresMigrator, StorageConfig,
};

/// Apply pending migrations to the configured database
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let StorageConfig::Postgres(pg_config) = config.storage.to_storage_config()? else {
        bail!("migrate requires storage.backend = postgres");
    };

    let pool = connect_pool(&pg_config).await?;
    let applied = run_storage_migrations(&pool).await?;
    let version = PostgresMigrator::new(pool).current_version().await?;

    info!(applied, version = ?version, "Migrations complete");
    Ok(())
}
