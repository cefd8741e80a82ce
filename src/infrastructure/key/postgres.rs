//! PostgreSQL key repository implementation

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::key::{
    Api, ConsumeOutcome, DeleteOutcome, Key, KeyMeta, KeyRepository, RemainingUpdate,
};
use crate::domain::DomainError;

const KEY_COLUMNS: &str =
    "id, api_id, hash, start, owner_id, name, meta, remaining, expires, created_at, deleted_at";

/// PostgreSQL implementation of [`KeyRepository`]
///
/// Every mutation of `remaining` locks the key row with `SELECT … FOR UPDATE`
/// inside a transaction.
pub struct PostgresKeyRepository {
    pool: PgPool,
}

impl Debug for PostgresKeyRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresKeyRepository").finish()
    }
}

impl PostgresKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_key(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        column: &str,
        value: &str,
        live_only: bool,
    ) -> Result<Option<Key>, DomainError> {
        let query = format!(
            "SELECT {} FROM keys WHERE {} = $1{} FOR UPDATE",
            KEY_COLUMNS,
            column,
            if live_only { " AND deleted_at IS NULL" } else { "" }
        );

        let row = sqlx::query(&query)
            .bind(value)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to lock key: {}", e)))?;

        row.as_ref().map(key_from_row).transpose()
    }

    async fn write_remaining(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        key: &Key,
    ) -> Result<(), DomainError> {
        sqlx::query("UPDATE keys SET remaining = $2 WHERE id = $1")
            .bind(key.id())
            .bind(key.remaining())
            .execute(&mut **tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to update remaining: {}", e)))?;

        Ok(())
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, DomainError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))
    }
}

async fn commit(tx: sqlx::Transaction<'_, sqlx::Postgres>) -> Result<(), DomainError> {
    tx.commit()
        .await
        .map_err(|e| DomainError::storage(format!("Failed to commit transaction: {}", e)))
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, DomainError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| DomainError::storage(format!("Failed to read column '{}': {}", name, e)))
}

fn key_from_row(row: &PgRow) -> Result<Key, DomainError> {
    let meta: serde_json::Value = column(row, "meta")?;
    let meta: KeyMeta = serde_json::from_value(meta)
        .map_err(|e| DomainError::storage(format!("Failed to deserialize key meta: {}", e)))?;

    let mut key = Key::new(
        column::<String>(row, "id")?,
        column::<String>(row, "api_id")?,
        column::<String>(row, "hash")?,
        column::<String>(row, "start")?,
    )
    .with_meta(meta)
    .with_remaining(column(row, "remaining")?)
    .with_expires(column(row, "expires")?)
    .with_created_at(column(row, "created_at")?)
    .with_deleted_at(column(row, "deleted_at")?);

    if let Some(owner_id) = column::<Option<String>>(row, "owner_id")? {
        key = key.with_owner_id(owner_id);
    }
    if let Some(name) = column::<Option<String>>(row, "name")? {
        key = key.with_name(name);
    }

    Ok(key)
}

fn api_from_row(row: &PgRow) -> Result<Api, DomainError> {
    Ok(Api::new(
        column::<String>(row, "id")?,
        column::<String>(row, "workspace_id")?,
        column::<String>(row, "name")?,
    )
    .with_created_at(column::<DateTime<Utc>>(row, "created_at")?))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl KeyRepository for PostgresKeyRepository {
    async fn get_api(&self, id: &str) -> Result<Option<Api>, DomainError> {
        let row = sqlx::query("SELECT id, workspace_id, name, created_at FROM apis WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get api: {}", e)))?;

        row.as_ref().map(api_from_row).transpose()
    }

    async fn create_api(&self, api: Api) -> Result<Api, DomainError> {
        sqlx::query("INSERT INTO apis (id, workspace_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(api.id())
            .bind(api.workspace_id())
            .bind(api.name())
            .bind(api.created_at())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::conflict(format!("Api '{}' already exists", api.id()))
                } else {
                    DomainError::storage(format!("Failed to create api: {}", e))
                }
            })?;

        Ok(api)
    }

    async fn create(&self, key: Key) -> Result<Key, DomainError> {
        let meta = serde_json::to_value(key.meta())
            .map_err(|e| DomainError::storage(format!("Failed to serialize key meta: {}", e)))?;

        let query = format!(
            "INSERT INTO keys ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            KEY_COLUMNS
        );

        sqlx::query(&query)
            .bind(key.id())
            .bind(key.api_id())
            .bind(key.hash())
            .bind(key.start())
            .bind(key.owner_id())
            .bind(key.name())
            .bind(&meta)
            .bind(key.remaining())
            .bind(key.expires())
            .bind(key.created_at())
            .bind(key.deleted_at())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DomainError::conflict(format!("Key '{}' already exists", key.id()))
                } else {
                    DomainError::storage(format!("Failed to create key: {}", e))
                }
            })?;

        Ok(key)
    }

    async fn get(&self, id: &str) -> Result<Option<Key>, DomainError> {
        let query = format!(
            "SELECT {} FROM keys WHERE id = $1 AND deleted_at IS NULL",
            KEY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to get key: {}", e)))?;

        row.as_ref().map(key_from_row).transpose()
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Key>, DomainError> {
        let query = format!(
            "SELECT {} FROM keys WHERE hash = $1 AND deleted_at IS NULL",
            KEY_COLUMNS
        );

        let row = sqlx::query(&query)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to find key: {}", e)))?;

        row.as_ref().map(key_from_row).transpose()
    }

    async fn consume(&self, hash: &str) -> Result<ConsumeOutcome, DomainError> {
        let mut tx = self.begin().await?;

        let Some(mut key) = Self::lock_key(&mut tx, "hash", hash, true).await? else {
            return Ok(ConsumeOutcome::NotFound);
        };

        let outcome = match key.remaining() {
            None => ConsumeOutcome::Unlimited(key),
            Some(remaining) if remaining <= 0 => ConsumeOutcome::Exhausted(key),
            Some(_) => {
                key.apply_remaining(RemainingUpdate::Decrement(1))?;
                Self::write_remaining(&mut tx, &key).await?;
                ConsumeOutcome::Consumed(key)
            }
        };

        commit(tx).await?;
        Ok(outcome)
    }

    async fn update_remaining(
        &self,
        id: &str,
        update: RemainingUpdate,
    ) -> Result<Key, DomainError> {
        let mut tx = self.begin().await?;

        let mut key = Self::lock_key(&mut tx, "id", id, true)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Key '{}' not found", id)))?;

        key.apply_remaining(update)?;
        Self::write_remaining(&mut tx, &key).await?;
        commit(tx).await?;

        Ok(key)
    }

    async fn soft_delete(
        &self,
        id: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<DeleteOutcome, DomainError> {
        let mut tx = self.begin().await?;

        let Some(mut key) = Self::lock_key(&mut tx, "id", id, false).await? else {
            return Ok(DeleteOutcome::NotFound);
        };

        if !key.mark_deleted(deleted_at) {
            return Ok(DeleteOutcome::AlreadyDeleted(key));
        }

        sqlx::query("UPDATE keys SET deleted_at = $2 WHERE id = $1")
            .bind(key.id())
            .bind(key.deleted_at())
            .execute(&mut *tx)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete key: {}", e)))?;

        commit(tx).await?;
        Ok(DeleteOutcome::Deleted(key))
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Database unreachable: {}", e)))?;
        Ok(())
    }
}
