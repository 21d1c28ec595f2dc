//! SurrealDB implementation of [`SessionFlagStore`].

use chrono::{DateTime, Utc};
use duouniversal_core::error::DuoResult;
use duouniversal_core::repository::SessionFlagStore;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use super::digest_id;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct FlagRow {
    verified_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// Session flags keyed by a digest of the session id. A flag stops
/// counting at its `expires_at`.
#[derive(Clone)]
pub struct SurrealSessionFlagStore<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealSessionFlagStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// When the session passed, if the flag is still live.
    pub async fn verified_at(&self, session_id: &str) -> DuoResult<Option<DateTime<Utc>>> {
        let mut result = self
            .db
            .query(
                "SELECT verified_at FROM type::record('session_flag', $id) \
                 WHERE expires_at > time::now()",
            )
            .bind(("id", digest_id(&[session_id])))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<FlagRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().next().map(|row| row.verified_at))
    }

    /// Delete expired flags and return how many there were.
    pub async fn cleanup_expired(&self) -> DuoResult<u64> {
        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM session_flag \
                 WHERE expires_at <= time::now() GROUP ALL",
            )
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        self.db
            .query("DELETE session_flag WHERE expires_at <= time::now()")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        debug!(removed = total, "Expired session flags removed");
        Ok(total)
    }
}

impl<C: Connection> SessionFlagStore for SurrealSessionFlagStore<C> {
    async fn is_verified(&self, session_id: &str) -> DuoResult<bool> {
        Ok(self.verified_at(session_id).await?.is_some())
    }

    async fn mark_verified(
        &self,
        session_id: &str,
        verified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DuoResult<()> {
        self.db
            .query(
                "UPSERT type::record('session_flag', $id) SET \
                 verified_at = $verified_at, \
                 expires_at = $expires_at",
            )
            .bind(("id", digest_id(&[session_id])))
            .bind(("verified_at", verified_at))
            .bind(("expires_at", expires_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> DuoResult<()> {
        self.db
            .query("DELETE type::record('session_flag', $id)")
            .bind(("id", digest_id(&[session_id])))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }
}
