//! A file-backed store keeps its contents across reopen.

use veilgate_core::{Principal, Timestamp};
use veilgate_store::{InsertResult, JournalEntry, Snapshot, SnapshotStore, SqliteStore};

#[tokio::test]
async fn test_reopen_preserves_snapshots_and_journal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("veilgate.db");
    let caller = Principal::from_bytes([7; 20]);

    {
        let store = SqliteStore::open(&path).unwrap();
        for height in 1..=3u64 {
            let state = format!("state-{height}").into_bytes();
            store
                .put_snapshot(&Snapshot::new("token", height, state, Timestamp::from_secs(height)))
                .await
                .unwrap();
            store
                .append_journal(&JournalEntry::new(
                    "token",
                    height,
                    caller,
                    Timestamp::from_secs(height),
                    Vec::<u8>::new(),
                ))
                .await
                .unwrap();
        }
    }

    let store = SqliteStore::open(&path).unwrap();
    let latest = store.latest_snapshot("token").await.unwrap().unwrap();
    assert_eq!(latest.height, 3);
    assert_eq!(&latest.state[..], b"state-3");
    assert_eq!(store.journal_since("token", 0).await.unwrap().len(), 3);

    // replaying an old commit is harmless
    let replay = Snapshot::new("token", 2, b"state-2".to_vec(), Timestamp::from_secs(2));
    assert_eq!(
        store.put_snapshot(&replay).await.unwrap(),
        InsertResult::AlreadyExists
    );
}
