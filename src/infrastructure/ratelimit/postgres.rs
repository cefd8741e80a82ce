//! PostgreSQL rate limit repository implementation

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::ratelimit::{Page, RatelimitNamespace, RatelimitOverride, RatelimitRepository};
use crate::domain::DomainError;

const OVERRIDE_COLUMNS: &str =
    "id, namespace_id, identifier, limit_count, duration_ms, async, created_at";

/// PostgreSQL implementation of [`RatelimitRepository`]
pub struct PostgresRatelimitRepository {
    pool: PgPool,
}

impl Debug for PostgresRatelimitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresRatelimitRepository").finish()
    }
}

impl PostgresRatelimitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage_err(action: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| {
        if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
            DomainError::conflict(format!("Failed to {}: already exists", action))
        } else {
            DomainError::storage(format!("Failed to {}: {}", action, e))
        }
    }
}

fn to_i64(value: u64, field: &str) -> Result<i64, DomainError> {
    i64::try_from(value).map_err(|_| DomainError::validation(format!("{} is too large", field)))
}

fn namespace_from_row(row: &PgRow) -> Result<RatelimitNamespace, sqlx::Error> {
    Ok(RatelimitNamespace::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("workspace_id")?,
        row.try_get::<String, _>("name")?,
    )
    .with_created_at(row.try_get::<DateTime<Utc>, _>("created_at")?))
}

fn override_from_row(row: &PgRow) -> Result<RatelimitOverride, sqlx::Error> {
    Ok(RatelimitOverride::new(
        row.try_get::<String, _>("id")?,
        row.try_get::<String, _>("namespace_id")?,
        row.try_get::<String, _>("identifier")?,
        row.try_get::<i64, _>("limit_count")?.max(0) as u64,
        row.try_get::<i64, _>("duration_ms")?.max(0) as u64,
    )
    .with_async(row.try_get("async")?)
    .with_created_at(row.try_get("created_at")?))
}

#[async_trait]
impl RatelimitRepository for PostgresRatelimitRepository {
    async fn get_namespace(&self, id: &str) -> Result<Option<RatelimitNamespace>, DomainError> {
        let row = sqlx::query(
            "SELECT id, workspace_id, name, created_at FROM ratelimit_namespaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err("get namespace"))?;

        row.as_ref()
            .map(namespace_from_row)
            .transpose()
            .map_err(storage_err("read namespace"))
    }

    async fn create_namespace(
        &self,
        namespace: RatelimitNamespace,
    ) -> Result<RatelimitNamespace, DomainError> {
        sqlx::query(
            "INSERT INTO ratelimit_namespaces (id, workspace_id, name, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(namespace.id())
        .bind(namespace.workspace_id())
        .bind(namespace.name())
        .bind(namespace.created_at())
        .execute(&self.pool)
        .await
        .map_err(storage_err("create namespace"))?;

        Ok(namespace)
    }

    async fn all_overrides(
        &self,
        namespace_id: &str,
    ) -> Result<Vec<RatelimitOverride>, DomainError> {
        let query = format!(
            "SELECT {} FROM ratelimit_overrides WHERE namespace_id = $1 ORDER BY id",
            OVERRIDE_COLUMNS
        );

        let rows = sqlx::query(&query)
            .bind(namespace_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("list overrides"))?;

        rows.iter()
            .map(override_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("read override"))
    }

    async fn list_overrides(
        &self,
        namespace_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<RatelimitOverride>, DomainError> {
        let query = format!(
            r#"
            SELECT {} FROM ratelimit_overrides
            WHERE namespace_id = $1 AND ($2::TEXT IS NULL OR id > $2)
            ORDER BY id
            LIMIT $3
            "#,
            OVERRIDE_COLUMNS
        );

        // One extra row tells whether another page exists
        let rows = sqlx::query(&query)
            .bind(namespace_id)
            .bind(cursor)
            .bind(to_i64(limit as u64 + 1, "limit")?)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("list overrides"))?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ratelimit_overrides WHERE namespace_id = $1")
                .bind(namespace_id)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_err("count overrides"))?;

        let mut items = rows
            .iter()
            .map(override_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_err("read override"))?;

        let has_more = items.len() > limit;
        items.truncate(limit);
        let cursor = if has_more {
            items.last().map(|o| o.id().to_string())
        } else {
            None
        };

        Ok(Page {
            items,
            cursor,
            total: total.max(0) as usize,
        })
    }

    async fn get_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<Option<RatelimitOverride>, DomainError> {
        let query = format!(
            "SELECT {} FROM ratelimit_overrides WHERE namespace_id = $1 AND identifier = $2",
            OVERRIDE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(namespace_id)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("get override"))?;

        row.as_ref()
            .map(override_from_row)
            .transpose()
            .map_err(storage_err("read override"))
    }

    async fn upsert_override(
        &self,
        ratelimit_override: RatelimitOverride,
    ) -> Result<RatelimitOverride, DomainError> {
        let query = format!(
            r#"
            INSERT INTO ratelimit_overrides ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (namespace_id, identifier) DO UPDATE
            SET limit_count = EXCLUDED.limit_count,
                duration_ms = EXCLUDED.duration_ms,
                async = EXCLUDED.async
            RETURNING {}
            "#,
            OVERRIDE_COLUMNS, OVERRIDE_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(ratelimit_override.id())
            .bind(ratelimit_override.namespace_id())
            .bind(ratelimit_override.identifier())
            .bind(to_i64(ratelimit_override.limit(), "limit")?)
            .bind(to_i64(ratelimit_override.duration(), "duration")?)
            .bind(ratelimit_override.is_async())
            .bind(ratelimit_override.created_at())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err("upsert override"))?;

        override_from_row(&row).map_err(storage_err("read override"))
    }

    async fn delete_override(
        &self,
        namespace_id: &str,
        identifier: &str,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "DELETE FROM ratelimit_overrides WHERE namespace_id = $1 AND identifier = $2",
        )
        .bind(namespace_id)
        .bind(identifier)
        .execute(&self.pool)
        .await
        .map_err(storage_err("delete override"))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{new_id, IdPrefix};
    use crate::infrastructure::storage::{connect_pool, migrations, PostgresConfig};

    async fn repo() -> PostgresRatelimitRepository {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/keygate_test".to_string());
        let pool = connect_pool(&PostgresConfig::new(url)).await.unwrap();
        migrations::PostgresMigrator::new(pool.clone())
            .run_all(&migrations::storage_migrations())
            .await
            .unwrap();
        PostgresRatelimitRepository::new(pool)
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_upsert_and_paginate() {
        let repo = repo().await;
        let namespace = repo
            .create_namespace(RatelimitNamespace::new(
                new_id(IdPrefix::RatelimitNamespace),
                "ws_test",
                new_id(IdPrefix::RatelimitNamespace),
            ))
            .await
            .unwrap();

        for identifier in ["a", "b", "c"] {
            repo.upsert_override(RatelimitOverride::new(
                new_id(IdPrefix::RatelimitOverride),
                namespace.id(),
                identifier,
                5,
                1_000,
            ))
            .await
            .unwrap();
        }

        let page = repo.list_overrides(namespace.id(), 2, None).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.cursor.is_some());

        assert!(repo.delete_override(namespace.id(), "a").await.unwrap());
    }
}
