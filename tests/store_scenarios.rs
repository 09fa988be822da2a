//! End-to-end store scenarios
//!
//! Commit, reload, replicate between ledgers, and the integrity failures
//! that must abort a load or merge without side effects.

use std::cell::Cell;
use std::rc::Rc;

use entity_ledger::crypto::{hash_sha256, DigestAuth, PassphraseEncryption};
use entity_ledger::ledger::{LedgerStore, MemoryLedgerStore, Payload, Signer, Transaction};
use entity_ledger::manipulation::{Manipulation, PropertyOwner};
use entity_ledger::model::{Value, ValueSet};
use entity_ledger::store::{
    build_envelope, EntityStore, StoreConfig, StoreError, TransactionEnvelope,
};
use entity_ledger::testing::{fixture_registry, RESOURCE};

const SALT: &str = "00112233445566778899aabbccddeeff";

// =============================================================================
// Test Utilities
// =============================================================================

async fn open_store(ledger: &MemoryLedgerStore, config: StoreConfig) -> EntityStore {
    let store = EntityStore::open(fixture_registry(), ledger.clone(), config);
    store.load().await.expect("load failed");
    store
}

fn tags(values: &[&str]) -> Value {
    Value::Set(values.iter().map(|v| Value::from(*v)).collect::<ValueSet>())
}

/// Re-wraps the diff of `tx` into an unsigned, unencrypted transaction.
fn rewrap(tx: &Transaction, id: &str, date: i64, deps: &[String]) -> Transaction {
    let text = tx.payload.to_text().unwrap();
    let diff = TransactionEnvelope::parse(&tx.id, &text).unwrap().diff().to_string();
    let envelope = build_envelope(3, id, date, deps, None, &diff).unwrap();
    Transaction {
        id: id.to_string(),
        date,
        deps: deps.to_vec(),
        version: 3,
        signer: None,
        hash: hash_sha256(&envelope),
        signature: None,
        payload: Payload::Text(envelope),
    }
}

// =============================================================================
// Commit and reload
// =============================================================================

#[tokio::test]
async fn test_two_commits_replay_into_fresh_store() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;

    let resource = store
        .create_x(RESOURCE)
        .with_id("r1", &[("name", Value::from("Test Resource"))])
        .unwrap();
    let t1 = store.commit(None, None).await.unwrap();
    assert!(t1.is_genesis());
    assert_eq!(store.state().undo_count, 0);

    store.session().set_insert(&resource, "tags", "one").unwrap();
    store.session().set_insert(&resource, "tags", "two").unwrap();
    let t2 = store.commit(None, None).await.unwrap();
    assert_eq!(t2.deps, vec![t1.id.clone()]);
    assert_eq!(store.leaf_transaction_ids(), vec![t2.id.clone()]);

    let fresh = open_store(&ledger, StoreConfig::default()).await;
    let loaded = fresh.get("r1").unwrap();
    assert_eq!(loaded.get("name"), Value::from("Test Resource"));
    assert_eq!(loaded.get("tags"), tags(&["one", "two"]));
    assert_eq!(fresh.leaf_transaction_ids(), vec![t2.id.clone()]);

    let mut expected = vec![t1.id, t2.id];
    expected.sort();
    assert_eq!(fresh.persisted_transaction_ids(), expected);
    assert!(!fresh.state().can_commit);
}

#[tokio::test]
async fn test_payload_kind_follows_ledger_capability() {
    let blob_ledger = MemoryLedgerStore::new();
    let store = open_store(&blob_ledger, StoreConfig::default()).await;
    store.create(RESOURCE, &[]).unwrap();
    let tx = store.commit(None, None).await.unwrap();
    assert!(matches!(tx.payload, Payload::Blob(_)));

    let text_ledger = MemoryLedgerStore::text_only();
    let store = open_store(&text_ledger, StoreConfig::default()).await;
    store.create(RESOURCE, &[]).unwrap();
    let tx = store.commit(None, None).await.unwrap();
    assert!(matches!(tx.payload, Payload::Text(_)));
    assert_eq!(tx.hash, hash_sha256(&tx.payload.to_text().unwrap()));
}

#[tokio::test]
async fn test_undone_changes_are_not_committed() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;

    let resource = store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
    store.session().set(&resource, "name", "kept").unwrap();
    store.session().set(&resource, "name", "undone").unwrap();
    store.buffer().undo().unwrap();
    store.commit(None, None).await.unwrap();

    let fresh = open_store(&ledger, StoreConfig::default()).await;
    assert_eq!(fresh.get("r1").unwrap().get("name"), Value::from("kept"));
}

// =============================================================================
// Entity API
// =============================================================================

#[tokio::test]
async fn test_create_applies_defaults_unless_raw() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;

    let cooked = store.create(RESOURCE, &[("size", Value::Long(3))]).unwrap();
    assert_eq!(cooked.get_direct("archived"), Value::Boolean(false));
    assert_eq!(cooked.get_direct("size"), Value::Long(3));
    assert_eq!(store.state().undo_count, 1);

    let raw = store.create_raw(RESOURCE, &[]).unwrap();
    assert!(raw.get_direct("archived").is_null());
    assert_eq!(store.state().undo_count, 2);

    // A creation undoes as one unit
    store.buffer().undo().unwrap();
    store.buffer().undo().unwrap();
    assert!(store.list(RESOURCE).is_empty());
}

#[tokio::test]
async fn test_get_find_and_delete() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;

    let resource = store.create_x(RESOURCE).raw().with_id("r1", &[]).unwrap();
    assert!(store.find("r1").is_some());
    assert!(matches!(store.get("nope"), Err(StoreError::EntityNotFound(id)) if id == "nope"));

    store.delete(&resource).unwrap();
    assert!(store.find("r1").is_none());
    assert!(store.list(RESOURCE).is_empty());
}

#[tokio::test]
async fn test_apply_is_not_recorded() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    let resource = store.create_x(RESOURCE).raw().with_id("r1", &[]).unwrap();
    let head = store.state().undo_count;

    let remote = Manipulation::change_value(
        PropertyOwner::new(resource.clone(), "name"),
        Value::from("remote"),
        Value::Null,
    );
    store.apply(&[remote]).unwrap();

    assert_eq!(resource.get("name"), Value::from("remote"));
    assert_eq!(store.state().undo_count, head);
}

#[tokio::test]
async fn test_initializers_run_untracked_on_load() {
    let ledger = MemoryLedgerStore::new();
    let config = StoreConfig::default().with_initializer(|store: &EntityStore| {
        store.create_x(RESOURCE).with_id("seed", &[("name", Value::from("seeded"))])?;
        Ok(())
    });
    let store = open_store(&ledger, config).await;

    assert_eq!(store.get("seed").unwrap().get("name"), Value::from("seeded"));
    assert!(!store.state().can_commit);

    // Reloading re-seeds without duplicating
    store.load().await.unwrap();
    assert_eq!(store.list(RESOURCE).len(), 1);
}

#[tokio::test]
async fn test_requires_sync_flag() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    assert!(!store.requires_sync().await.unwrap());
    store.set_requires_sync(true).await.unwrap();
    assert!(ledger.requires_sync().await.unwrap());
}

// =============================================================================
// Encryption and signing
// =============================================================================

#[tokio::test]
async fn test_wrong_passphrase_rejects_load() {
    let ledger = MemoryLedgerStore::new();
    let writer_config =
        StoreConfig::default().with_encryption(PassphraseEncryption::with_passphrase(SALT, "A"));
    let writer = open_store(&ledger, writer_config).await;
    writer.create_x(RESOURCE).with_id("secret", &[]).unwrap();
    writer.commit(None, None).await.unwrap();

    let stored = ledger.fetch().await.unwrap();
    assert!(!stored[0].payload.to_text().unwrap().contains("secret"));

    let reader_config =
        StoreConfig::default().with_encryption(PassphraseEncryption::with_passphrase(SALT, "B"));
    let reader = EntityStore::open(fixture_registry(), ledger.clone(), reader_config);
    assert!(matches!(reader.load().await, Err(StoreError::WrongDecryptionKey)));
    assert!(reader.session().is_empty());

    let same_key =
        StoreConfig::default().with_encryption(PassphraseEncryption::with_passphrase(SALT, "A"));
    let reader = open_store(&ledger, same_key).await;
    assert!(reader.find("secret").is_some());
}

#[tokio::test]
async fn test_signed_commit_verifies_on_load() {
    let ledger = MemoryLedgerStore::new();
    let signer = Signer::new("0xabc").with_name("Alice");
    let store = open_store(&ledger, StoreConfig::default().with_auth(DigestAuth::new("MockApp"))).await;
    store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
    let tx = store.commit(Some(&signer), None).await.unwrap();
    assert_eq!(tx.signer.as_ref(), Some(&signer));
    assert!(tx.signature.is_some());

    let fresh = open_store(&ledger, StoreConfig::default().with_auth(DigestAuth::new("MockApp"))).await;
    assert!(fresh.find("r1").is_some());

    let other = EntityStore::open(
        fixture_registry(),
        ledger.clone(),
        StoreConfig::default().with_auth(DigestAuth::new("OtherApp")),
    );
    assert!(matches!(other.load().await, Err(StoreError::WrongSignature(_))));
}

#[tokio::test]
async fn test_signing_requires_signer() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default().with_auth(DigestAuth::new("MockApp"))).await;
    store.create(RESOURCE, &[]).unwrap();

    assert!(matches!(store.commit(None, None).await, Err(StoreError::MissingSigner)));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_withdrawn_signing_appends_nothing() {
    let ledger = MemoryLedgerStore::new();
    let signer = Signer::new("0xabc");
    let store = open_store(&ledger, StoreConfig::default().with_auth(DigestAuth::new("MockApp"))).await;
    store.create(RESOURCE, &[]).unwrap();

    let always = || true;
    let result = store.commit(Some(&signer), Some(&always)).await;
    assert!(matches!(result, Err(StoreError::SigningWithdrawn)));

    // Withdrawn while the signature was being produced
    let calls = Cell::new(0);
    let after_sign = || {
        calls.set(calls.get() + 1);
        calls.get() > 1
    };
    let result = store.commit(Some(&signer), Some(&after_sign)).await;
    assert!(matches!(result, Err(StoreError::SigningWithdrawn)));
    assert_eq!(calls.get(), 2);

    assert!(ledger.is_empty());
    assert!(store.state().can_commit);

    let never = || false;
    store.commit(Some(&signer), Some(&never)).await.unwrap();
    assert_eq!(ledger.len(), 1);
}

#[tokio::test]
async fn test_edits_made_while_signing_stay_for_the_next_commit() {
    let ledger = MemoryLedgerStore::new();
    let signer = Signer::new("0xabc");
    let config = || StoreConfig::default().with_auth(DigestAuth::new("MockApp"));
    let store = open_store(&ledger, config()).await;
    let resource = store.create_x(RESOURCE).with_id("r1", &[]).unwrap();

    // The second check runs after the signature resolved
    let checks = Cell::new(0);
    let edit_while_signing = || {
        checks.set(checks.get() + 1);
        if checks.get() == 2 {
            store.session().set(&resource, "name", "late").unwrap();
        }
        false
    };
    store.commit(Some(&signer), Some(&edit_while_signing)).await.unwrap();

    assert_eq!(store.state().undo_count, 1);
    assert!(store.buffer().is_part_of_commit(&resource));

    store.commit(Some(&signer), None).await.unwrap();
    assert_eq!(ledger.len(), 2);

    let fresh = open_store(&ledger, config()).await;
    assert_eq!(fresh.get("r1").unwrap().get("name"), Value::from("late"));
}

// =============================================================================
// Replication
// =============================================================================

#[tokio::test]
async fn test_concurrent_commits_converge_after_merge() {
    let ledger_a = MemoryLedgerStore::new();
    let ledger_b = MemoryLedgerStore::new();

    let a = open_store(&ledger_a, StoreConfig::default()).await;
    a.create_x(RESOURCE).with_id("r1", &[]).unwrap();
    let genesis = a.commit(None, None).await.unwrap();

    let b = EntityStore::open(fixture_registry(), ledger_b.clone(), StoreConfig::default());
    let merged = b.merge(ledger_a.fetch().await.unwrap()).await.unwrap();
    assert_eq!(merged, vec![genesis.id.clone()]);
    b.load().await.unwrap();

    a.session().set(&a.get("r1").unwrap(), "name", "from a").unwrap();
    let from_a = a.commit(None, None).await.unwrap();
    b.session().set(&b.get("r1").unwrap(), "size", 5i64).unwrap();
    let from_b = b.commit(None, None).await.unwrap();

    a.merge(ledger_b.fetch().await.unwrap()).await.unwrap();
    a.load().await.unwrap();

    let resource = a.get("r1").unwrap();
    assert_eq!(resource.get("name"), Value::from("from a"));
    assert_eq!(resource.get("size"), Value::Long(5));

    let mut leaves = a.leaf_transaction_ids();
    leaves.sort();
    let mut expected = vec![from_a.id, from_b.id];
    expected.sort();
    assert_eq!(leaves, expected);

    a.session().set(&resource, "name", "joined").unwrap();
    let join = a.commit(None, None).await.unwrap();
    let mut deps = join.deps.clone();
    deps.sort();
    assert_eq!(deps, expected);
}

#[tokio::test]
async fn test_merge_skips_known_transactions() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    store.create(RESOURCE, &[]).unwrap();
    let tx = store.commit(None, None).await.unwrap();

    let appended = store.merge(vec![tx.clone(), tx]).await.unwrap();
    assert!(appended.is_empty());
    assert_eq!(ledger.len(), 1);
}

// =============================================================================
// Integrity
// =============================================================================

#[tokio::test]
async fn test_tampered_record_is_inconsistent() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    store.create(RESOURCE, &[]).unwrap();
    let mut tx = store.commit(None, None).await.unwrap();
    tx.date += 1;

    let target_ledger = MemoryLedgerStore::new();
    let target = EntityStore::open(fixture_registry(), target_ledger.clone(), StoreConfig::default());
    let result = target.merge(vec![tx.clone()]).await;
    assert!(matches!(result, Err(StoreError::InconsistentTransaction(_))));
    assert!(target_ledger.is_empty());

    target_ledger.append(&tx).await.unwrap();
    assert!(matches!(target.load().await, Err(StoreError::InconsistentTransaction(_))));
}

#[tokio::test]
async fn test_failed_replay_leaves_no_partial_state() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    let resource = store.create_x(RESOURCE).with_id("r1", &[]).unwrap();
    let genesis = store.commit(None, None).await.unwrap();
    store.session().set(&resource, "name", "renamed").unwrap();
    let rename = store.commit(None, None).await.unwrap();

    let other = open_store(&MemoryLedgerStore::new(), StoreConfig::default()).await;
    other.create_x(RESOURCE).with_id("r2", &[]).unwrap();
    let other_genesis = other.commit(None, None).await.unwrap();

    // A rename of r1 grafted onto a history that never created r1
    let broken_ledger = MemoryLedgerStore::text_only();
    let base = rewrap(&other_genesis, "base", genesis.date, &[]);
    let orphan = rewrap(&rename, "orphan", genesis.date + 1, &["base".to_string()]);
    broken_ledger.append_many(&[base, orphan]).await.unwrap();

    let broken = EntityStore::open(fixture_registry(), broken_ledger, StoreConfig::default());
    assert!(broken.load().await.is_err());
    assert!(broken.session().is_empty());
    assert!(broken.find("r2").is_none());
}

#[tokio::test]
async fn test_ledger_without_genesis_fails_to_load() {
    let ledger = MemoryLedgerStore::new();
    let store = open_store(&ledger, StoreConfig::default()).await;
    store.create(RESOURCE, &[]).unwrap();
    let tx = store.commit(None, None).await.unwrap();

    let dangling = MemoryLedgerStore::new();
    dangling
        .append(&rewrap(&tx, "t2", tx.date, &["missing".to_string()]))
        .await
        .unwrap();

    let loader = EntityStore::open(fixture_registry(), dangling, StoreConfig::default());
    assert!(matches!(
        loader.load().await,
        Err(StoreError::NoGenesisTransaction { count: 1 })
    ));
}

#[tokio::test]
async fn test_shared_ledger_handle() {
    let ledger: Rc<dyn LedgerStore> = Rc::new(MemoryLedgerStore::new());
    let store = EntityStore::open_shared(fixture_registry(), Rc::clone(&ledger), StoreConfig::default());
    store.load().await.unwrap();
    store.create(RESOURCE, &[]).unwrap();
    store.commit(None, None).await.unwrap();
    assert_eq!(ledger.fetch().await.unwrap().len(), 1);
}
