//! SQL schema definitions and migrations.
//!
//! The schema is a single `positions` table keyed by item id, with an index
//! that serves every ordered read of a container. It is portable between
//! SQLite and PostgreSQL except for the item id collation: PostgreSQL uses
//! `"C"` so that tie-breaks compare bytes, as SQLite's default `BINARY`
//! collation and Rust's `String` ordering do.
//!
//! # Migration System
//!
//! Migrations are code-based so they can branch on dialect.
//!
//! ## Adding a New Migration
//!
//! 1. Increment `SCHEMA_VERSION`
//! 2. Add a new `migrate_vN_to_vM` async function
//! 3. Add the migration to the match statement in `run_migration`

use crate::Result;
use crate::store::StoreError;

use super::{DbKind, SqlxResultExt, SqlxStore};

/// Current schema version.
pub const SCHEMA_VERSION: i64 = 1;

/// Value written and read back to prove the position column keeps all 64
/// bits: the largest double below 1.0.
pub const PRECISION_PROBE: f64 = 1.0 - f64::EPSILON / 2.0;

/// Item and container id of the probe row. It never outlives the probe.
const PROBE_ITEM: &str = "__ordinal_precision_probe__";

/// Statements creating the schema tables for `kind`.
pub fn create_tables(kind: DbKind) -> [&'static str; 2] {
    let positions = match kind {
        DbKind::Sqlite => {
            "CREATE TABLE IF NOT EXISTS positions (
                item_id TEXT PRIMARY KEY NOT NULL,
                container_id TEXT NOT NULL,
                position DOUBLE PRECISION NOT NULL
            )"
        }
        DbKind::Postgres => {
            "CREATE TABLE IF NOT EXISTS positions (
                item_id TEXT COLLATE \"C\" PRIMARY KEY NOT NULL,
                container_id TEXT NOT NULL,
                position DOUBLE PRECISION NOT NULL
            )"
        }
    };
    [
        // BIGINT (64-bit) used for portability between SQLite and PostgreSQL
        "CREATE TABLE IF NOT EXISTS schema_version (
            version BIGINT PRIMARY KEY
        )",
        positions,
    ]
}

/// SQL statements to create indexes.
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_positions_order ON positions(container_id, position, item_id)",
];

/// Initialize the database schema.
///
/// Creates tables and indexes if they don't exist, runs pending migrations,
/// and verifies that positions survive a round trip unchanged.
pub async fn initialize(store: &SqlxStore) -> Result<()> {
    let pool = store.pool();

    for statement in create_tables(store.kind()) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Schema creation failed - SQL: {statement}"))?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .sql_context("Failed to check schema version")?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .sql_context("Failed to initialize schema version")?;
        }
        Some((current,)) if current < SCHEMA_VERSION => {
            migrate(store, current, SCHEMA_VERSION).await?;
        }
        Some((current,)) if current > SCHEMA_VERSION => {
            return Err(StoreError::unavailable(format!(
                "database schema v{current} is newer than supported v{SCHEMA_VERSION}"
            ))
            .into());
        }
        Some(_) => {}
    }

    for statement in CREATE_INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Index creation failed - SQL: {statement}"))?;
    }

    verify_precision(store).await
}

/// Writes [`PRECISION_PROBE`] into the `positions` table and reads it back,
/// inside a transaction that is always rolled back.
///
/// A table created by an older tool keeps its column type across
/// `CREATE TABLE IF NOT EXISTS`, so the check has to go through the column
/// itself. Fails with [`StoreError::PositionColumnType`] if the row is not
/// stored as a double, and [`StoreError::PrecisionLoss`] if any bit changes.
pub async fn verify_precision(store: &SqlxStore) -> Result<()> {
    let (select, expected_type) = match store.kind() {
        DbKind::Sqlite => (
            "SELECT typeof(position), CAST(position AS DOUBLE PRECISION) FROM positions WHERE item_id = $1",
            "real",
        ),
        DbKind::Postgres => (
            "SELECT pg_typeof(position)::text, CAST(position AS DOUBLE PRECISION) FROM positions WHERE item_id = $1",
            "double precision",
        ),
    };

    let mut tx = store
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin precision probe")?;
    sqlx::query("INSERT INTO positions (item_id, container_id, position) VALUES ($1, $2, $3)")
        .bind(PROBE_ITEM)
        .bind(PROBE_ITEM)
        .bind(PRECISION_PROBE)
        .execute(&mut *tx)
        .await
        .sql_context("Failed to write precision probe")?;
    let probed: std::result::Result<(String, f64), sqlx::Error> =
        sqlx::query_as(select).bind(PROBE_ITEM).fetch_one(&mut *tx).await;
    tx.rollback()
        .await
        .sql_context("Failed to roll back precision probe")?;
    let (column_type, read) = probed.sql_context("Failed to read precision probe")?;

    if !column_type.eq_ignore_ascii_case(expected_type) {
        tracing::error!(found = %column_type, "Position column is not a double");
        return Err(StoreError::PositionColumnType { found: column_type }.into());
    }
    if read.to_bits() != PRECISION_PROBE.to_bits() {
        tracing::error!(written = PRECISION_PROBE, read, "Position column loses precision");
        return Err(StoreError::PrecisionLoss {
            written: PRECISION_PROBE,
            read,
        }
        .into());
    }
    Ok(())
}

/// Run migrations sequentially from one schema version to another.
async fn migrate(store: &SqlxStore, from: i64, to: i64) -> Result<()> {
    tracing::info!(from, to, "Starting SQL schema migration");

    let mut current = from;
    while current < to {
        let next = current + 1;
        tracing::info!(from = current, to = next, "Running migration");

        run_migration(store, current, next).await?;

        sqlx::query("UPDATE schema_version SET version = $1")
            .bind(next)
            .execute(store.pool())
            .await
            .sql_context(&format!("Failed to update schema version to {next}"))?;

        tracing::info!(version = next, "Migration completed");
        current = next;
    }

    tracing::info!(from, to, "All migrations completed successfully");
    Ok(())
}

/// Execute a single migration step.
async fn run_migration(store: &SqlxStore, from: i64, to: i64) -> Result<()> {
    // No migrations exist yet; reaching this means SCHEMA_VERSION was bumped
    // without adding a match arm here.
    let _ = store;

    Err(StoreError::unavailable(format!(
        "Unknown migration path: v{from} to v{to}. \
         This likely means SCHEMA_VERSION was incremented without adding a migration."
    ))
    .into())
}
