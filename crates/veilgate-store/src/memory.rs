//! In-memory implementation of the SnapshotStore trait.
//!
//! Same semantics as SQLite, nothing persisted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, JournalEntry, Snapshot, SnapshotStore};

/// In-memory store. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    /// (namespace, height) -> snapshot.
    snapshots: BTreeMap<(String, u64), Snapshot>,

    /// (namespace, height) -> journal entry.
    journal: BTreeMap<(String, u64), JournalEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn put_snapshot(&self, snapshot: &Snapshot) -> Result<InsertResult> {
        self.commit(Some(snapshot), None).await
    }

    async fn latest_snapshot(&self, namespace: &str) -> Result<Option<Snapshot>> {
        let inner = self.read()?;
        Ok(inner
            .snapshots
            .range((namespace.to_string(), 0)..=(namespace.to_string(), u64::MAX))
            .next_back()
            .map(|(_, s)| s.clone()))
    }

    async fn get_snapshot(&self, namespace: &str, height: u64) -> Result<Option<Snapshot>> {
        let inner = self.read()?;
        Ok(inner
            .snapshots
            .get(&(namespace.to_string(), height))
            .cloned())
    }

    async fn append_journal(&self, entry: &JournalEntry) -> Result<InsertResult> {
        self.commit(None, Some(entry)).await
    }

    async fn journal_since(&self, namespace: &str, after: u64) -> Result<Vec<JournalEntry>> {
        if after == u64::MAX {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .journal
            .range((namespace.to_string(), after + 1)..=(namespace.to_string(), u64::MAX))
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn commit(
        &self,
        snapshot: Option<&Snapshot>,
        entry: Option<&JournalEntry>,
    ) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let snapshot_write = snapshot.map(|s| {
            let stored = inner
                .snapshots
                .get(&(s.namespace.clone(), s.height))
                .map(|existing| existing.state_hash);
            InsertResult::against(stored, s.state_hash)
        });
        let entry_write = entry.map(|e| {
            let stored = inner
                .journal
                .get(&(e.namespace.clone(), e.height))
                .map(|existing| existing.entry_hash);
            InsertResult::against(stored, e.entry_hash)
        });

        if let Some(conflict) = [&snapshot_write, &entry_write]
            .into_iter()
            .flatten()
            .find(|result| result.is_conflict())
        {
            return Ok(conflict.clone());
        }

        let mut inserted = false;
        if let (Some(s), Some(InsertResult::Inserted)) = (snapshot, &snapshot_write) {
            inner.snapshots.insert((s.namespace.clone(), s.height), s.clone());
            inserted = true;
        }
        if let (Some(e), Some(InsertResult::Inserted)) = (entry, &entry_write) {
            inner.journal.insert((e.namespace.clone(), e.height), e.clone());
            inserted = true;
        }
        Ok(if inserted {
            InsertResult::Inserted
        } else {
            InsertResult::AlreadyExists
        })
    }

    async fn namespaces(&self) -> Result<Vec<String>> {
        let inner = self.read()?;
        let names: BTreeSet<String> = inner
            .snapshots
            .keys()
            .chain(inner.journal.keys())
            .map(|(ns, _)| ns.clone())
            .collect();
        Ok(names.into_iter().collect())
    }
}
