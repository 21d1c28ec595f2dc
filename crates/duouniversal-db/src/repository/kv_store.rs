//! SurrealDB implementation of [`KeyValueStore`].

use chrono::{DateTime, Utc};
use duouniversal_core::error::DuoResult;
use duouniversal_core::repository::KeyValueStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use super::digest_id;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct EntryRow {
    entry_value: String,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Expiring key-value entries in the `kv_entry` table.
#[derive(Clone)]
pub struct SurrealKeyValueStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealKeyValueStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Delete expired entries and return how many there were.
    pub async fn cleanup_expired(&self) -> DuoResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM kv_entry \
                 WHERE expires_at <= time::now() GROUP ALL",
            )
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE kv_entry WHERE expires_at <= time::now()")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        debug!(removed = total, "Expired key-value entries removed");
        Ok(total)
    }
}

impl<C: Connection> KeyValueStore for SurrealKeyValueStore<C> {
    async fn set(
        &self,
        kind: &str,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> DuoResult<()> {
        self.db
            .query(
                "UPSERT type::record('kv_entry', $id) SET \
                 kind = $kind, \
                 entry_key = $key, \
                 entry_value = $value, \
                 expires_at = $expires_at",
            )
            .bind(("id", digest_id(&[kind, key])))
            .bind(("kind", kind.to_string()))
            .bind(("key", key.to_string()))
            .bind(("value", value.to_string()))
            .bind(("expires_at", expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get(&self, kind: &str, key: &str) -> DuoResult<Option<String>> {
        let mut result = self
            .db
            .query(
                "SELECT entry_value FROM type::record('kv_entry', $id) \
                 WHERE expires_at > time::now()",
            )
            .bind(("id", digest_id(&[kind, key])))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EntryRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|row| row.entry_value))
    }

    async fn delete(&self, kind: &str, key: &str) -> DuoResult<()> {
        self.db
            .query("DELETE type::record('kv_entry', $id)")
            .bind(("id", digest_id(&[kind, key])))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn take(&self, kind: &str, key: &str) -> DuoResult<Option<String>> {
        // One statement: of two concurrent takes only one sees the row.
        let mut result = self
            .db
            .query(
                "DELETE type::record('kv_entry', $id) \
                 WHERE expires_at > time::now() RETURN BEFORE",
            )
            .bind(("id", digest_id(&[kind, key])))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        let rows: Vec<EntryRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|row| row.entry_value))
    }
}
