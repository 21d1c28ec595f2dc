//! SurrealDB connection management.

use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::{Connection, Surreal};
use surrealdb::opt::auth::Root;
use tracing::info;

use crate::error::DbError;
use crate::repository::{SurrealKeyValueStore, SurrealSessionFlagStore, SurrealStateRepository};
use crate::schema::run_migrations;

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// WebSocket address (e.g. `127.0.0.1:8000`).
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "duouniversal".into(),
            database: "main".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

/// A migrated connection and the repositories built on it.
///
/// Defaults to the WebSocket client; tests use the in-memory engine
/// through [`DbManager::from_client`].
#[derive(Clone)]
pub struct DbManager<C: Connection = Client> {
    db: Surreal<C>,
}

impl DbManager<Client> {
    /// Connect, sign in as root, select namespace and database, and bring
    /// the schema up to date.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting to SurrealDB"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;

        Self::from_client(db).await
    }
}

impl<C: Connection> DbManager<C> {
    /// Take a connection with namespace and database already selected and
    /// run pending migrations on it.
    pub async fn from_client(db: Surreal<C>) -> Result<Self, DbError> {
        run_migrations(&db).await?;
        info!("SurrealDB schema up to date");
        Ok(Self { db })
    }

    pub fn client(&self) -> &Surreal<C> {
        &self.db
    }

    /// Correlation entries (nonce -> state id).
    pub fn key_value_store(&self) -> SurrealKeyValueStore<C> {
        SurrealKeyValueStore::new(self.db.clone())
    }

    pub fn state_repository(&self) -> SurrealStateRepository<C> {
        SurrealStateRepository::new(self.db.clone())
    }

    pub fn session_flags(&self) -> SurrealSessionFlagStore<C> {
        SurrealSessionFlagStore::new(self.db.clone())
    }
}
