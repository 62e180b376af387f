//! Schema bootstrap for the entity store.

use rusqlite::{Connection, OptionalExtension, Transaction};

use super::StoreError;

/// Version recorded in `osm_schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Create the entity and cache tables and record the schema version.
///
/// Existing databases must already carry [`SCHEMA_VERSION`]; other versions
/// are rejected.
pub fn initialise_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let transaction = connection
        .transaction()
        .map_err(|source| StoreError::Migration {
            step: "begin schema transaction",
            source,
        })?;

    create_entity_tables(&transaction)?;
    create_cache_tables(&transaction)?;
    ensure_schema_version(&transaction)?;

    transaction
        .commit()
        .map_err(|source| StoreError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_entity_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create osm_headers",
        "CREATE TABLE IF NOT EXISTS osm_headers (
            replication_sequence_number INTEGER PRIMARY KEY,
            replication_timestamp INTEGER NOT NULL,
            replication_url TEXT NOT NULL,
            source TEXT NOT NULL,
            writing_program TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_nodes",
        "CREATE TABLE IF NOT EXISTS osm_nodes (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL,
            uid INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            changeset INTEGER NOT NULL,
            user_name TEXT NOT NULL,
            tags TEXT NOT NULL,
            geometry BLOB,
            lon REAL NOT NULL,
            lat REAL NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_ways",
        "CREATE TABLE IF NOT EXISTS osm_ways (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL,
            uid INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            changeset INTEGER NOT NULL,
            user_name TEXT NOT NULL,
            tags TEXT NOT NULL,
            geometry BLOB,
            nodes TEXT NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_relations",
        "CREATE TABLE IF NOT EXISTS osm_relations (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL,
            uid INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            changeset INTEGER NOT NULL,
            user_name TEXT NOT NULL,
            tags TEXT NOT NULL,
            geometry BLOB,
            members TEXT NOT NULL
        )",
    )
}

fn create_cache_tables(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create osm_coordinates",
        "CREATE TABLE IF NOT EXISTS osm_coordinates (
            id INTEGER PRIMARY KEY,
            x REAL NOT NULL,
            y REAL NOT NULL
        )",
    )?;
    run_migration_step(
        transaction,
        "create osm_references",
        "CREATE TABLE IF NOT EXISTS osm_references (
            id INTEGER PRIMARY KEY,
            nodes TEXT NOT NULL
        )",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), StoreError> {
    run_migration_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS osm_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing: Option<i64> = transaction
        .query_row("SELECT version FROM osm_schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|source| StoreError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(StoreError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO osm_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| StoreError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_migration_step(
    transaction: &Transaction<'_>,
    step: &'static str,
    sql: &str,
) -> Result<(), StoreError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| StoreError::Migration { step, source })
}
