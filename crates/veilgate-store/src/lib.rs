//! # Veilgate Store
//!
//! Persistence for committed runtime state. A runtime writes, per committed
//! call, a CBOR snapshot of its state and a journal entry naming the caller
//! and the events emitted.
//!
//! ## Key Types
//!
//! - [`SnapshotStore`] - the async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - in-memory storage for tests
//! - [`InsertResult`] - result of writing a snapshot or entry
//!
//! ## Usage
//!
//! ```rust,no_run
//! use veilgate_core::Timestamp;
//! use veilgate_store::{InsertResult, Snapshot, SnapshotStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("veilgate.db").unwrap();
//!     let snapshot = Snapshot::new("token", 1, b"state".to_vec(), Timestamp::from_secs(0));
//!     assert_eq!(store.put_snapshot(&snapshot).await.unwrap(), InsertResult::Inserted);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent writes**: writing the same snapshot twice returns `AlreadyExists`
//! - **Conflict detection**: different bytes at the same height return `Conflict`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ContentHash, InsertResult, JournalEntry, Snapshot, SnapshotStore};
