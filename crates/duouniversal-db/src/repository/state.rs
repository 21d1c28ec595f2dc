//! SurrealDB implementation of [`StateRepository`].
//!
//! States are stored as a JSON payload next to the stage they were saved
//! under; a load with a different stage finds nothing.

use duouniversal_core::error::DuoResult;
use duouniversal_core::models::state::SuspendedState;
use duouniversal_core::repository::StateRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct StateRow {
    stage: String,
    payload: String,
}

#[derive(Clone)]
pub struct SurrealStateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealStateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> StateRepository for SurrealStateRepository<C> {
    async fn save_state(&self, state: &SuspendedState, stage: &str) -> DuoResult<String> {
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(state).map_err(DbError::from)?;

        self.db
            .query("CREATE type::record('auth_state', $id) SET stage = $stage, payload = $payload")
            .bind(("id", id.clone()))
            .bind(("stage", stage.to_string()))
            .bind(("payload", payload))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(id)
    }

    async fn load_state(&self, state_id: &str, stage: &str) -> DuoResult<Option<SuspendedState>> {
        let mut result = self
            .db
            .query("SELECT stage, payload FROM type::record('auth_state', $id)")
            .bind(("id", state_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<StateRow> = result.take(0).map_err(DbError::from)?;
        let Some(row) = rows.into_iter().find(|row| row.stage == stage) else {
            return Ok(None);
        };

        let state = serde_json::from_str(&row.payload).map_err(DbError::from)?;
        Ok(Some(state))
    }
}
