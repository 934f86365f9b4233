//! SQLite implementation of the SnapshotStore trait.
//!
//! rusqlite with bundled SQLite. Calls run on the blocking pool via
//! `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};

use veilgate_core::{Principal, Timestamp, PRINCIPAL_LEN};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ContentHash, InsertResult, JournalEntry, Snapshot, SnapshotStore};

/// SQLite-based store. Thread-safe via an internal mutex.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, creating and migrating it
    /// as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&conn)
        })
        .await?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn blob_to_hash(bytes: Vec<u8>, column: usize) -> rusqlite::Result<ContentHash> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(column, "hash".into(), rusqlite::types::Type::Blob)
    })?;
    Ok(ContentHash(arr))
}

fn row_to_snapshot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Snapshot> {
    let state: Vec<u8> = row.get("state")?;
    Ok(Snapshot {
        namespace: row.get("namespace")?,
        height: row.get("height")?,
        state_hash: blob_to_hash(row.get("state_hash")?, 2)?,
        state: Bytes::from(state),
        committed_at: Timestamp::from_secs(row.get("committed_at")?),
    })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalEntry> {
    let caller: Vec<u8> = row.get("caller")?;
    let caller: [u8; PRINCIPAL_LEN] = caller.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(2, "caller".into(), rusqlite::types::Type::Blob)
    })?;
    let events: Vec<u8> = row.get("events")?;
    Ok(JournalEntry {
        namespace: row.get("namespace")?,
        height: row.get("height")?,
        caller: Principal::from_bytes(caller),
        at: Timestamp::from_secs(row.get("at")?),
        events: Bytes::from(events),
        entry_hash: blob_to_hash(row.get("entry_hash")?, 5)?,
    })
}

const SNAPSHOT_HASH: &str =
    "SELECT state_hash FROM snapshots WHERE namespace = ?1 AND height = ?2";
const ENTRY_HASH: &str = "SELECT entry_hash FROM journal WHERE namespace = ?1 AND height = ?2";

fn stored_hash(
    conn: &Connection,
    query: &str,
    namespace: &str,
    height: u64,
) -> Result<Option<ContentHash>> {
    let bytes: Option<Vec<u8>> = conn
        .query_row(query, params![namespace, height], |row| row.get(0))
        .optional()?;
    Ok(bytes.map(|b| blob_to_hash(b, 0)).transpose()?)
}

fn insert_snapshot(conn: &Connection, snapshot: &Snapshot) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots (namespace, height, state_hash, state, committed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            snapshot.namespace,
            snapshot.height,
            snapshot.state_hash.as_bytes().as_slice(),
            &snapshot.state[..],
            snapshot.committed_at.as_secs(),
        ],
    )?;
    tracing::debug!(
        namespace = %snapshot.namespace,
        height = snapshot.height,
        bytes = snapshot.state.len(),
        "snapshot written"
    );
    Ok(())
}

fn insert_entry(conn: &Connection, entry: &JournalEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO journal (namespace, height, caller, at, events, entry_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.namespace,
            entry.height,
            entry.caller.as_bytes().as_slice(),
            entry.at.as_secs(),
            &entry.events[..],
            entry.entry_hash.as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<InsertResult> {
        self.commit(Some(snapshot), None).await
    }

    async fn latest_snapshot(&self, namespace: &str) -> Result<Option<Snapshot>> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let snapshot = conn
                .query_row(
                    "SELECT namespace, height, state_hash, state, committed_at
                     FROM snapshots WHERE namespace = ?1
                     ORDER BY height DESC LIMIT 1",
                    params![namespace],
                    row_to_snapshot,
                )
                .optional()?;
            Ok(snapshot)
        })
        .await
    }

    async fn get_snapshot(&self, namespace: &str, height: u64) -> Result<Option<Snapshot>> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let snapshot = conn
                .query_row(
                    "SELECT namespace, height, state_hash, state, committed_at
                     FROM snapshots WHERE namespace = ?1 AND height = ?2",
                    params![namespace, height],
                    row_to_snapshot,
                )
                .optional()?;
            Ok(snapshot)
        })
        .await
    }

    async fn append_journal(&self, entry: &JournalEntry) -> Result<InsertResult> {
        self.commit(None, Some(entry)).await
    }

    async fn journal_since(&self, namespace: &str, after: u64) -> Result<Vec<JournalEntry>> {
        let namespace = namespace.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT namespace, height, caller, at, events, entry_hash
                 FROM journal WHERE namespace = ?1 AND height > ?2
                 ORDER BY height ASC",
            )?;
            let entries = stmt
                .query_map(params![namespace, after], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn commit(
        &self,
        snapshot: Option<&Snapshot>,
        entry: Option<&JournalEntry>,
    ) -> Result<InsertResult> {
        let snapshot = snapshot.cloned();
        let entry = entry.cloned();
        self.with_conn(move |conn| {
            // Dropping `tx` without committing rolls back.
            let tx = conn.unchecked_transaction()?;

            let snapshot_write = match &snapshot {
                Some(s) => Some(InsertResult::against(
                    stored_hash(&tx, SNAPSHOT_HASH, &s.namespace, s.height)?,
                    s.state_hash,
                )),
                None => None,
            };
            let entry_write = match &entry {
                Some(e) => Some(InsertResult::against(
                    stored_hash(&tx, ENTRY_HASH, &e.namespace, e.height)?,
                    e.entry_hash,
                )),
                None => None,
            };
            if let Some(conflict) = [&snapshot_write, &entry_write]
                .into_iter()
                .flatten()
                .find(|result| result.is_conflict())
            {
                return Ok(conflict.clone());
            }

            let mut inserted = false;
            if let (Some(s), Some(InsertResult::Inserted)) = (&snapshot, &snapshot_write) {
                insert_snapshot(&tx, s)?;
                inserted = true;
            }
            if let (Some(e), Some(InsertResult::Inserted)) = (&entry, &entry_write) {
                insert_entry(&tx, e)?;
                inserted = true;
            }
            tx.commit()?;

            Ok(if inserted {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT namespace FROM snapshots
                 UNION
                 SELECT namespace FROM journal
                 ORDER BY namespace",
            )?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
        .await
    }
}
