//! The runtime: serialized, all-or-nothing execution of contract calls.
//!
//! A [`Runtime`] owns the committed state of one contract (or a group of
//! contracts deployed together, such as an [`crate::AuctionHouse`]). Each
//! call runs against a private clone of the committed state. On success the
//! clone is persisted, becomes the committed state at the next height and
//! its events are published; on error it is dropped and nothing is
//! observable.
//!
//! Writers are serialized by an async mutex. Readers take the latest
//! committed `Arc<S>` and never wait for a writer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, Mutex};

use veilgate_core::{
    from_cbor, to_cbor, Account, Clock, ConfidentialBackend, Principal, Timestamp,
};
use veilgate_store::{InsertResult, JournalEntry, Snapshot, SnapshotStore};

use crate::config::RuntimeConfig;
use crate::context::CallContext;
use crate::error::{Result, VeilError};
use crate::events::EventRecord;

/// What a committed call returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    /// Events emitted by the call, stamped with its height.
    pub events: Vec<EventRecord>,
    /// Height the call committed at.
    pub height: u64,
}

/// A journal entry with its events decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub height: u64,
    pub caller: Principal,
    pub at: Timestamp,
    pub events: Vec<EventRecord>,
}

struct Committed<S> {
    state: Arc<S>,
    height: u64,
}

pub struct Runtime<S> {
    config: RuntimeConfig,
    backend: Arc<dyn ConfidentialBackend>,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn SnapshotStore>>,
    committed: RwLock<Committed<S>>,
    writer: Mutex<()>,
    events: broadcast::Sender<EventRecord>,
}

impl<S> Runtime<S>
where
    S: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// A runtime without persistence, starting at height 0.
    pub fn new(
        state: S,
        config: RuntimeConfig,
        backend: Arc<dyn ConfidentialBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::build(state, 0, config, backend, clock, None)
    }

    /// A runtime that persists every committed call to `store`.
    pub fn with_store(
        state: S,
        config: RuntimeConfig,
        backend: Arc<dyn ConfidentialBackend>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self::build(state, 0, config, backend, clock, Some(store))
    }

    /// Rebuild a runtime from the latest snapshot in `config.namespace`.
    ///
    /// Refused with [`VeilError::JournalAhead`] if calls were journaled after
    /// that snapshot; with `persist_snapshots` off, [`Runtime::checkpoint`]
    /// before shutting down.
    pub async fn restore(
        config: RuntimeConfig,
        backend: Arc<dyn ConfidentialBackend>,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let snapshot = store
            .latest_snapshot(&config.namespace)
            .await?
            .ok_or_else(|| VeilError::NoSnapshot(config.namespace.clone()))?;
        let journaled = store
            .journal_since(&config.namespace, snapshot.height)
            .await?;
        if let Some(last) = journaled.last() {
            return Err(VeilError::JournalAhead {
                namespace: config.namespace.clone(),
                snapshot: snapshot.height,
                journal: last.height,
            });
        }
        let state: S = from_cbor(&snapshot.state)?;
        tracing::debug!(
            namespace = %config.namespace,
            height = snapshot.height,
            "runtime restored"
        );
        Ok(Self::build(
            state,
            snapshot.height,
            config,
            backend,
            clock,
            Some(store),
        ))
    }

    fn build(
        state: S,
        height: u64,
        config: RuntimeConfig,
        backend: Arc<dyn ConfidentialBackend>,
        clock: Arc<dyn Clock>,
        store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            backend,
            clock,
            store,
            committed: RwLock::new(Committed {
                state: Arc::new(state),
                height,
            }),
            writer: Mutex::new(()),
            events,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn ConfidentialBackend {
        self.backend.as_ref()
    }

    /// Make `account` reachable by re-encryption.
    pub fn register_account(&self, account: &Account) {
        self.backend
            .register_account(account.principal(), account.encryption_public());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Run `call` as `caller` and commit its effects, or none of them.
    pub async fn execute<T, F>(&self, caller: Principal, call: F) -> Result<Outcome<T>>
    where
        T: Send,
        F: FnOnce(&mut S, &mut CallContext<'_>) -> Result<T> + Send,
    {
        let _writer = self.writer.lock().await;

        let (mut state, height) = {
            let committed = self.read();
            (S::clone(&committed.state), committed.height + 1)
        };
        let now = self.clock.now();
        let mut events = Vec::new();

        let result = {
            let mut ctx = CallContext::new(caller, now, self.backend.as_ref(), &mut events);
            call(&mut state, &mut ctx)
        };
        let value = match result {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(
                    namespace = %self.config.namespace,
                    %caller,
                    %error,
                    "call aborted"
                );
                return Err(error);
            }
        };

        for record in &mut events {
            record.height = height;
        }
        self.persist(height, caller, now, &state, &events).await?;

        *self.write() = Committed {
            state: Arc::new(state),
            height,
        };
        for record in &events {
            // No subscribers is not an error.
            let _ = self.events.send(record.clone());
        }
        tracing::debug!(
            namespace = %self.config.namespace,
            height,
            events = events.len(),
            "call committed"
        );

        Ok(Outcome {
            value,
            events,
            height,
        })
    }

    /// Write a snapshot of the committed state, regardless of
    /// `persist_snapshots`. Returns the height written.
    pub async fn checkpoint(&self) -> Result<u64> {
        let _writer = self.writer.lock().await;
        let (state, height) = {
            let committed = self.read();
            (Arc::clone(&committed.state), committed.height)
        };
        if let Some(store) = &self.store {
            self.put_snapshot(store.as_ref(), height, &state, self.clock.now())
                .await?;
        }
        Ok(height)
    }

    async fn persist(
        &self,
        height: u64,
        caller: Principal,
        at: Timestamp,
        state: &S,
        events: &[EventRecord],
    ) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = if self.config.persist_snapshots {
            Some(Snapshot::new(
                self.config.namespace.clone(),
                height,
                to_cbor(state)?,
                at,
            ))
        } else {
            None
        };
        let entry = if self.config.record_journal {
            Some(JournalEntry::new(
                self.config.namespace.clone(),
                height,
                caller,
                at,
                to_cbor(&events)?,
            ))
        } else {
            None
        };
        if snapshot.is_none() && entry.is_none() {
            return Ok(());
        }

        // Snapshot and entry land together or not at all.
        match store.commit(snapshot.as_ref(), entry.as_ref()).await? {
            InsertResult::Conflict { .. } => Err(self.conflict(height)),
            InsertResult::Inserted | InsertResult::AlreadyExists => Ok(()),
        }
    }

    async fn put_snapshot(
        &self,
        store: &dyn SnapshotStore,
        height: u64,
        state: &S,
        at: Timestamp,
    ) -> Result<()> {
        let snapshot = Snapshot::new(self.config.namespace.clone(), height, to_cbor(state)?, at);
        match store.put_snapshot(&snapshot).await? {
            InsertResult::Inserted => {
                tracing::debug!(
                    namespace = %self.config.namespace,
                    height,
                    hash = %snapshot.state_hash,
                    "snapshot written"
                );
                Ok(())
            }
            InsertResult::AlreadyExists => Ok(()),
            InsertResult::Conflict { .. } => Err(self.conflict(height)),
        }
    }

    fn conflict(&self, height: u64) -> VeilError {
        VeilError::CommitConflict {
            namespace: self.config.namespace.clone(),
            height,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The latest committed state.
    pub fn snapshot(&self) -> Arc<S> {
        Arc::clone(&self.read().state)
    }

    /// Height of the latest committed call.
    pub fn height(&self) -> u64 {
        self.read().height
    }

    /// Run a read-only function over the committed state.
    pub fn view<R>(&self, f: impl FnOnce(&S, &dyn ConfidentialBackend) -> R) -> R {
        let state = self.snapshot();
        f(&state, self.backend.as_ref())
    }

    /// Receive events of calls committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.events.subscribe()
    }

    /// Journal entries after `after`, with events decoded.
    pub async fn journal_since(&self, after: u64) -> Result<Vec<JournalRecord>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        store
            .journal_since(&self.config.namespace, after)
            .await?
            .into_iter()
            .map(|entry| {
                Ok(JournalRecord {
                    height: entry.height,
                    caller: entry.caller,
                    at: entry.at,
                    events: from_cbor(&entry.events)?,
                })
            })
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Committed<S>> {
        self.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Committed<S>> {
        self.committed.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> std::fmt::Debug for Runtime<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("namespace", &self.config.namespace)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
