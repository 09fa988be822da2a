//! Draft recovery against the file ledger
//!
//! Uncommitted edits persisted to the draft log must survive a restart,
//! become the buffer head again, and disappear once committed.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use entity_ledger::crypto::PassphraseEncryption;
use entity_ledger::ledger::{FileLedgerStore, LedgerStore};
use entity_ledger::model::Value;
use entity_ledger::store::{EntityStore, StoreConfig, StoreError};
use entity_ledger::testing::{fixture_registry, RESOURCE};
use tempfile::TempDir;
use tokio::task::LocalSet;

const SALT: &str = "00112233445566778899aabbccddeeff";

// =============================================================================
// Test Utilities
// =============================================================================

fn draft_config() -> StoreConfig {
    StoreConfig::default().with_draft(true)
}

async fn open_store(dir: &Path, config: StoreConfig) -> EntityStore {
    let ledger = FileLedgerStore::open(dir).expect("open ledger");
    let store = EntityStore::open(fixture_registry(), ledger, config);
    store.load().await.expect("load failed");
    store
}

/// Runs a test inside a LocalSet so draft persistence can be spawned.
fn run_local<F: Future<Output = ()>>(test: F) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    LocalSet::new().block_on(&runtime, test);
}

/// Gives background draft persistence a chance to run.
async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn draft_len(dir: &Path) -> usize {
    FileLedgerStore::open(dir)
        .unwrap()
        .fetch_draft()
        .await
        .unwrap()
        .len()
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_uncommitted_edits_survive_restart() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), draft_config()).await;
            store
                .create_x(RESOURCE)
                .with_id("r1", &[("name", Value::from("draft"))])
                .unwrap();
            store.wait_for_empty_queue().await.unwrap();
        }

        let store = open_store(temp_dir.path(), draft_config()).await;
        let resource = store.get("r1").unwrap();
        assert_eq!(resource.get("name"), Value::from("draft"));
        assert!(store.state().can_commit);
        assert!(store.persisted_transaction_ids().is_empty());

        // Recovered edits undo like local ones
        store.buffer().undo().unwrap();
        assert!(store.find("r1").is_none());
        store.buffer().redo().unwrap();
        store.wait_for_empty_queue().await.unwrap();

        store.commit(None, None).await.unwrap();
        drop(store);
        assert_eq!(draft_len(temp_dir.path()).await, 0);

        let store = open_store(temp_dir.path(), draft_config()).await;
        assert_eq!(store.get("r1").unwrap().get("name"), Value::from("draft"));
        assert!(!store.state().can_commit);
        assert_eq!(store.persisted_transaction_ids().len(), 1);
    });
}

#[test]
fn test_draft_sits_on_top_of_committed_history() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), draft_config()).await;
            let resource = store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
            store.commit(None, None).await.unwrap();

            store.session().set(&resource, "name", "pending").unwrap();
            store.session().set(&resource, "size", 7i64).unwrap();
            store.buffer().undo().unwrap();
            store.wait_for_empty_queue().await.unwrap();
        }
        assert_eq!(draft_len(temp_dir.path()).await, 1);

        let store = open_store(temp_dir.path(), draft_config()).await;
        let resource = store.get("r1").unwrap();
        assert_eq!(resource.get("name"), Value::from("pending"));
        assert!(resource.get("size").is_null());
        assert_eq!(store.state().undo_count, 1);
    });
}

#[test]
fn test_edits_persist_without_waiting() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), draft_config()).await;
            store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
            settle().await;
        }
        assert_eq!(draft_len(temp_dir.path()).await, 1);

        let store = open_store(temp_dir.path(), draft_config()).await;
        assert!(store.find("r1").is_some());
    });
}

#[test]
fn test_deferred_edits_are_persisted_after_resume() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), draft_config()).await;
            store.defer_persistence(true);
            store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
            settle().await;
            let pending =
                tokio::time::timeout(Duration::from_millis(20), store.wait_for_empty_queue()).await;
            assert!(pending.is_err());

            store.defer_persistence(false);
            store.wait_for_empty_queue().await.unwrap();
        }
        assert_eq!(draft_len(temp_dir.path()).await, 1);

        let store = open_store(temp_dir.path(), draft_config()).await;
        assert!(store.find("r1").is_some());
    });
}

// =============================================================================
// Cascades
// =============================================================================

#[test]
fn test_extending_an_earlier_edit_keeps_later_ones() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), draft_config()).await;
            let resource = store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
            let trigger = store.session().set(&resource, "name", "n").unwrap();
            store.session().set(&resource, "creator", "kept").unwrap();
            store.wait_for_empty_queue().await.unwrap();

            let frame = store.buffer().open_nested_frame(Some(trigger));
            store.session().set(&resource, "mimeType", "text/plain").unwrap();
            frame.close();
            store.wait_for_empty_queue().await.unwrap();
        }
        assert_eq!(draft_len(temp_dir.path()).await, 3);

        let store = open_store(temp_dir.path(), draft_config()).await;
        let resource = store.get("r1").unwrap();
        assert_eq!(resource.get("name"), Value::from("n"));
        assert_eq!(resource.get("creator"), Value::from("kept"));
        assert_eq!(resource.get("mimeType"), Value::from("text/plain"));
        assert_eq!(store.state().undo_count, 3);
    });
}

#[test]
fn test_without_draft_management_nothing_is_persisted() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = open_store(temp_dir.path(), StoreConfig::default()).await;
            store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
            store.wait_for_empty_queue().await.unwrap();
        }
        assert_eq!(draft_len(temp_dir.path()).await, 0);
    });
}

// =============================================================================
// Encrypted drafts
// =============================================================================

#[test]
fn test_encrypted_draft_needs_the_same_passphrase() {
    run_local(async {
        let temp_dir = TempDir::new().unwrap();
        let config = |passphrase: &str| {
            draft_config().with_encryption(PassphraseEncryption::with_passphrase(SALT, passphrase))
        };
        {
            let store = open_store(temp_dir.path(), config("A")).await;
            store.create_x(RESOURCE).with_id("hidden", &[]).unwrap();
            store.wait_for_empty_queue().await.unwrap();
        }

        let records = FileLedgerStore::open(temp_dir.path())
            .unwrap()
            .fetch_draft()
            .await
            .unwrap();
        assert!(records.iter().all(|r| r.encrypted && !r.data.contains("hidden")));

        let ledger = FileLedgerStore::open(temp_dir.path()).unwrap();
        let wrong = EntityStore::open(fixture_registry(), ledger, config("B"));
        assert!(matches!(wrong.load().await, Err(StoreError::WrongDecryptionKey)));
        drop(wrong);

        let store = open_store(temp_dir.path(), config("A")).await;
        assert!(store.find("hidden").is_some());
    });
}
