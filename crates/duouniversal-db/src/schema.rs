//! Schema definitions and migration runner.
//!
//! Tables are SCHEMAFULL. Record ids are either random UUIDs or hex
//! SHA-256 digests, so they are always plain strings.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "session_flag_expiry",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Expiring key-value entries (nonce -> state id)
-- =======================================================================
DEFINE TABLE kv_entry SCHEMAFULL;
DEFINE FIELD kind ON TABLE kv_entry TYPE string;
DEFINE FIELD entry_key ON TABLE kv_entry TYPE string;
DEFINE FIELD entry_value ON TABLE kv_entry TYPE string;
DEFINE FIELD expires_at ON TABLE kv_entry TYPE datetime;
DEFINE FIELD created_at ON TABLE kv_entry TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_kv_entry_expires ON TABLE kv_entry COLUMNS expires_at;

-- =======================================================================
-- Suspended authentication states
-- =======================================================================
DEFINE TABLE auth_state SCHEMAFULL;
DEFINE FIELD stage ON TABLE auth_state TYPE string;
DEFINE FIELD payload ON TABLE auth_state TYPE string;
DEFINE FIELD created_at ON TABLE auth_state TYPE datetime \
    DEFAULT time::now();

-- =======================================================================
-- Browser sessions that passed the second factor
-- =======================================================================
DEFINE TABLE session_flag SCHEMAFULL;
DEFINE FIELD verified_at ON TABLE session_flag TYPE datetime;
";

// -----------------------------------------------------------------------
// Schema v2: session flags end with the browser session
// -----------------------------------------------------------------------

// Flags written before v2 expire at once.
const SCHEMA_V2: &str = "\
DEFINE FIELD expires_at ON TABLE session_flag TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_session_flag_expires ON TABLE session_flag \
    COLUMNS expires_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Apply every migration newer than the recorded schema version.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Raw DDL of schema version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
