//! Database-specific error types and conversions.

use duouniversal_core::error::DuoError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stored state is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<DbError> for DuoError {
    fn from(err: DbError) -> Self {
        DuoError::Store(err.to_string())
    }
}
