//! Store trait: the abstract interface for committed-state persistence.
//!
//! A runtime commits state in numbered heights within a namespace. Each
//! commit may write a snapshot of the whole state and a journal entry
//! describing the call that produced it. Both are content-hashed so that
//! replaying the same commit is harmless and a divergent one is detected.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use veilgate_core::{Principal, Timestamp};

use crate::error::Result;

/// A Blake3 digest of stored bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Hash a byte string.
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The encoded state of a namespace at a height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub namespace: String,
    pub height: u64,
    pub state_hash: ContentHash,
    pub state: Bytes,
    pub committed_at: Timestamp,
}

impl Snapshot {
    pub fn new(
        namespace: impl Into<String>,
        height: u64,
        state: impl Into<Bytes>,
        committed_at: Timestamp,
    ) -> Self {
        let state = state.into();
        Self {
            namespace: namespace.into(),
            height,
            state_hash: ContentHash::of(&state),
            state,
            committed_at,
        }
    }
}

/// A record of the call that produced a height.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub namespace: String,
    pub height: u64,
    pub caller: Principal,
    pub at: Timestamp,
    /// Encoded events emitted by the call.
    pub events: Bytes,
    pub entry_hash: ContentHash,
}

impl JournalEntry {
    pub fn new(
        namespace: impl Into<String>,
        height: u64,
        caller: Principal,
        at: Timestamp,
        events: impl Into<Bytes>,
    ) -> Self {
        let events = events.into();
        let mut hasher = blake3::Hasher::new();
        hasher.update(caller.as_bytes());
        hasher.update(&at.as_secs().to_be_bytes());
        hasher.update(&events);
        Self {
            namespace: namespace.into(),
            height,
            caller,
            at,
            events,
            entry_hash: ContentHash(*hasher.finalize().as_bytes()),
        }
    }
}

/// Result of writing a snapshot or journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Written.
    Inserted,
    /// The identical record already exists (idempotent, not an error).
    AlreadyExists,
    /// A different record exists at the same `(namespace, height)`.
    Conflict {
        /// Hash of the record already stored.
        existing: ContentHash,
    },
}

impl InsertResult {
    /// What writing a record hashed `incoming` does, given the hash already
    /// stored under its key.
    pub fn against(existing: Option<ContentHash>, incoming: ContentHash) -> Self {
        match existing {
            None => InsertResult::Inserted,
            Some(existing) if existing == incoming => InsertResult::AlreadyExists,
            Some(existing) => InsertResult::Conflict { existing },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, InsertResult::Conflict { .. })
    }
}

/// Async interface for snapshot and journal persistence.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a snapshot.
    ///
    /// # Returns
    /// - `Inserted` if no snapshot existed at this height.
    /// - `AlreadyExists` if the same bytes are already stored there.
    /// - `Conflict` if different bytes are stored there.
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<InsertResult>;

    /// The snapshot with the greatest height in a namespace.
    async fn latest_snapshot(&self, namespace: &str) -> Result<Option<Snapshot>>;

    /// The snapshot at exactly `height`.
    async fn get_snapshot(&self, namespace: &str, height: u64) -> Result<Option<Snapshot>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Journal
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a journal entry, with the same idempotence rules as snapshots.
    async fn append_journal(&self, entry: &JournalEntry) -> Result<InsertResult>;

    /// Entries with `height > after`, ordered by height.
    async fn journal_since(&self, namespace: &str, after: u64) -> Result<Vec<JournalEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Commits
    // ─────────────────────────────────────────────────────────────────────────

    /// Write the records of one committed height together: every given
    /// record is stored, or none is.
    ///
    /// # Returns
    /// - `Conflict` for the first record (snapshot before entry) that
    ///   differs from a stored one. Nothing is written.
    /// - `AlreadyExists` if every given record is already stored.
    /// - `Inserted` otherwise.
    async fn commit(
        &self,
        snapshot: Option<&Snapshot>,
        entry: Option<&JournalEntry>,
    ) -> Result<InsertResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Namespaces
    // ─────────────────────────────────────────────────────────────────────────

    /// Every namespace with at least one snapshot or journal entry, sorted.
    async fn namespaces(&self) -> Result<Vec<String>>;
}
