//! SQLite schema, one numbered step at a time.
//!
//! `schema_version` holds the highest applied step. Pending steps run inside
//! a single transaction, so a half-migrated file is never observed.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Bring `conn` up to [`SCHEMA_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let from: u32 = conn
        .query_row("SELECT version FROM schema_version WHERE id = 0", [], |row| {
            row.get(0)
        })
        .optional()?
        .unwrap_or(0);

    if from > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{from} is newer than supported v{SCHEMA_VERSION}"
        )));
    }
    if from == SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for step in (from + 1)..=SCHEMA_VERSION {
        tracing::debug!(step, "migrating veilgate schema");
        tx.execute_batch(step_sql(step)?)?;
    }
    tx.execute(
        "INSERT INTO schema_version (id, version) VALUES (0, ?1)
         ON CONFLICT(id) DO UPDATE SET version = excluded.version",
        [SCHEMA_VERSION],
    )?;
    tx.commit()?;
    Ok(())
}

fn step_sql(step: u32) -> Result<&'static str> {
    match step {
        // Committed state and the per-call journal.
        1 => Ok(r#"
            CREATE TABLE snapshots (
                namespace    TEXT    NOT NULL,
                height       INTEGER NOT NULL,
                state_hash   BLOB    NOT NULL,  -- blake3 of state
                state        BLOB    NOT NULL,  -- CBOR
                committed_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, height)
            );

            CREATE TABLE journal (
                namespace  TEXT    NOT NULL,
                height     INTEGER NOT NULL,
                caller     BLOB    NOT NULL,    -- 20-byte principal
                at         INTEGER NOT NULL,
                events     BLOB    NOT NULL,    -- CBOR
                entry_hash BLOB    NOT NULL,
                PRIMARY KEY (namespace, height)
            );
        "#),
        // Lookups of a principal's calls across namespaces.
        2 => Ok("CREATE INDEX journal_by_caller ON journal(caller, namespace, height);"),
        other => Err(StoreError::Migration(format!("no schema step {other}"))),
    }
}
