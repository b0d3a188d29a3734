//! Tests for MemoryStore
//!
//! These tests verify:
//! - Basic get/insert/upsert/remove
//! - CAS guards on writes
//! - Pessimistic locks: exclusion, lock CAS, unlock, expiry
//! - Multi-get entries
//! - Passthrough operations (replace, touch, counter, sub-document, manager)

use std::time::Duration;

use serde_json::json;

use kvguard::store::{Transcoder, LOCKED_CAS};
use kvguard::{is_key_not_found, is_temporary_error, Cas, ErrorCode, KvStore, MemoryStore, StoreOptions};

fn no_opts() -> StoreOptions {
    StoreOptions::default()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[tokio::test]
async fn test_insert_then_get() {
    let store = MemoryStore::new();

    let written = store.insert("k", &json!({"a": 1}), &no_opts()).await.unwrap();
    let doc = store.get("k", &no_opts()).await.unwrap();

    assert_eq!(doc.value, json!({"a": 1}));
    assert_eq!(doc.cas, written.cas);
}

#[tokio::test]
async fn test_get_missing_key() {
    let store = MemoryStore::new();

    let err = store.get("missing", &no_opts()).await.unwrap_err();

    assert!(is_key_not_found(&err));
}

#[tokio::test]
async fn test_insert_existing_key_fails() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();

    let err = store.insert("k", &json!(2), &no_opts()).await.unwrap_err();

    assert!(err.is_cas_conflict());
    assert_eq!(store.get("k", &no_opts()).await.unwrap().value, json!(1));
}

#[tokio::test]
async fn test_every_mutation_issues_fresh_cas() {
    let store = MemoryStore::new();

    let first = store.upsert("k", &json!(1), &no_opts()).await.unwrap();
    let second = store.upsert("k", &json!(2), &no_opts()).await.unwrap();

    assert_ne!(first.cas, second.cas);
}

#[tokio::test]
async fn test_remove_missing_key_is_not_found() {
    let store = MemoryStore::new();

    let err = store.remove("missing", &no_opts()).await.unwrap_err();

    assert!(is_key_not_found(&err));
}

// =============================================================================
// CAS Tests
// =============================================================================

#[tokio::test]
async fn test_upsert_with_current_cas_succeeds() {
    let store = MemoryStore::new();
    let written = store.insert("k", &json!(1), &no_opts()).await.unwrap();

    let result = store
        .upsert("k", &json!(2), &no_opts().with_cas(written.cas))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_upsert_with_stale_cas_fails() {
    let store = MemoryStore::new();
    let stale = store.insert("k", &json!(1), &no_opts()).await.unwrap().cas;
    store.upsert("k", &json!(2), &no_opts()).await.unwrap();

    let err = store
        .upsert("k", &json!(3), &no_opts().with_cas(stale))
        .await
        .unwrap_err();

    assert!(err.is_cas_conflict());
    assert_eq!(store.get("k", &no_opts()).await.unwrap().value, json!(2));
}

#[tokio::test]
async fn test_upsert_with_cas_on_missing_key_is_not_found() {
    let store = MemoryStore::new();

    let err = store
        .upsert("k", &json!(1), &no_opts().with_cas(Cas(42)))
        .await
        .unwrap_err();

    assert!(is_key_not_found(&err));
}

#[tokio::test]
async fn test_remove_with_stale_cas_fails() {
    let store = MemoryStore::new();
    let stale = store.insert("k", &json!(1), &no_opts()).await.unwrap().cas;
    store.upsert("k", &json!(2), &no_opts()).await.unwrap();

    let err = store
        .remove("k", &no_opts().with_cas(stale))
        .await
        .unwrap_err();

    assert!(err.is_cas_conflict());
}

// =============================================================================
// Lock Tests
// =============================================================================

#[tokio::test]
async fn test_lock_excludes_other_lockers() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();

    store.get_and_lock("k", &no_opts()).await.unwrap();
    let err = store.get_and_lock("k", &no_opts()).await.unwrap_err();

    assert!(is_temporary_error(&err));
    assert!(store.is_locked("k"));
}

#[tokio::test]
async fn test_locked_document_rejects_writes_without_lock_cas() {
    let store = MemoryStore::new();
    let before = store.insert("k", &json!(1), &no_opts()).await.unwrap().cas;
    store.get_and_lock("k", &no_opts()).await.unwrap();

    let plain = store.upsert("k", &json!(2), &no_opts()).await.unwrap_err();
    let stale = store
        .upsert("k", &json!(2), &no_opts().with_cas(before))
        .await
        .unwrap_err();

    assert_eq!(plain.code, Some(ErrorCode::Locked));
    assert_eq!(stale.code, Some(ErrorCode::Locked));
}

#[tokio::test]
async fn test_plain_get_of_locked_document_reports_sentinel_cas() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    let locked = store.get_and_lock("k", &no_opts()).await.unwrap();

    let doc = store.get("k", &no_opts()).await.unwrap();

    assert_eq!(doc.value, json!(1));
    assert_eq!(doc.cas, LOCKED_CAS);
    assert_ne!(locked.cas, LOCKED_CAS);
}

#[tokio::test]
async fn test_write_with_lock_cas_releases_lock() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    let locked = store.get_and_lock("k", &no_opts()).await.unwrap();

    store
        .upsert("k", &json!(2), &no_opts().with_cas(locked.cas))
        .await
        .unwrap();

    assert!(!store.is_locked("k"));
    assert_eq!(store.get("k", &no_opts()).await.unwrap().value, json!(2));
}

#[tokio::test]
async fn test_unlock_then_remove_with_post_unlock_cas() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    let locked = store.get_and_lock("k", &no_opts()).await.unwrap();

    let unlocked = store.unlock("k", locked.cas).await.unwrap();
    assert!(!store.is_locked("k"));

    store
        .remove("k", &no_opts().with_cas(unlocked.cas))
        .await
        .unwrap();
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unlock_with_wrong_cas_fails() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    store.get_and_lock("k", &no_opts()).await.unwrap();

    let err = store.unlock("k", Cas(1)).await.unwrap_err();

    assert!(err.is_cas_conflict());
    assert!(store.is_locked("k"));
}

#[tokio::test]
async fn test_get_and_lock_missing_key_is_not_found() {
    let store = MemoryStore::new();

    let err = store.get_and_lock("missing", &no_opts()).await.unwrap_err();

    assert!(is_key_not_found(&err));
}

#[tokio::test]
async fn test_lock_expires() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    store
        .get_and_lock("k", &no_opts().with_lock_time_secs(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(!store.is_locked("k"));
    store.upsert("k", &json!(2), &no_opts()).await.unwrap();
}

// =============================================================================
// Multi-get Tests
// =============================================================================

#[tokio::test]
async fn test_get_multi_reports_hits_and_not_found_entries() {
    let store = MemoryStore::new();
    store.insert("a", &json!({"n": 1}), &no_opts()).await.unwrap();

    let keys = vec!["a".to_string(), "b".to_string()];
    let response = store.get_multi(&keys).await.unwrap();

    let a = response["a"].as_ref().unwrap();
    assert_eq!(a.value, Some(json!({"n": 1})));
    assert!(a.error.is_none());

    let b = response["b"].as_ref().unwrap();
    assert!(b.value.is_none());
    assert!(is_key_not_found(&b.error));
}

// =============================================================================
// Passthrough Operation Tests
// =============================================================================

#[tokio::test]
async fn test_replace_requires_existing_key() {
    let store = MemoryStore::new();

    let err = store.replace("k", &json!(1), &no_opts()).await.unwrap_err();
    assert!(is_key_not_found(&err));

    store.insert("k", &json!(1), &no_opts()).await.unwrap();
    store.replace("k", &json!(2), &no_opts()).await.unwrap();
    assert_eq!(store.get("k", &no_opts()).await.unwrap().value, json!(2));
}

#[tokio::test]
async fn test_counter_creates_with_initial_then_increments() {
    let store = MemoryStore::new();

    let (first, _) = store.counter("c", 5, Some(10), &no_opts()).await.unwrap();
    let (second, _) = store.counter("c", 5, Some(10), &no_opts()).await.unwrap();

    assert_eq!(first, 10);
    assert_eq!(second, 15);
}

#[tokio::test]
async fn test_counter_without_initial_on_missing_key_fails() {
    let store = MemoryStore::new();

    let err = store.counter("c", 1, None, &no_opts()).await.unwrap_err();

    assert!(is_key_not_found(&err));
}

#[tokio::test]
async fn test_touch_with_past_expiry_hides_document() {
    let store = MemoryStore::new();
    store.insert("k", &json!(1), &no_opts()).await.unwrap();

    store.touch("k", 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert!(is_key_not_found(&store.get("k", &no_opts()).await.unwrap_err()));
}

#[tokio::test]
async fn test_lookup_and_mutate_sub_document() {
    let store = MemoryStore::new();
    store
        .insert("k", &json!({"user": {"name": "ada"}, "tags": []}), &no_opts())
        .await
        .unwrap();

    store
        .mutate_in("k", "/user/age", &json!(36), &no_opts())
        .await
        .unwrap();
    store
        .mutate_in("k", "/tags/-", &json!("x"), &no_opts())
        .await
        .unwrap();

    let paths = vec![
        "/user/name".to_string(),
        "/user/age".to_string(),
        "/tags/0".to_string(),
        "/nope".to_string(),
    ];
    let values = store.lookup_in("k", &paths).await.unwrap();

    assert_eq!(
        values,
        vec![Some(json!("ada")), Some(json!(36)), Some(json!("x")), None]
    );
}

#[tokio::test]
async fn test_mutate_in_missing_parent_fails() {
    let store = MemoryStore::new();
    store.insert("k", &json!({}), &no_opts()).await.unwrap();

    let err = store
        .mutate_in("k", "/a/b", &json!(1), &no_opts())
        .await
        .unwrap_err();

    assert_eq!(err.code, Some(ErrorCode::Other("SUBDOC_PATH_ENOENT".to_string())));
}

#[tokio::test]
async fn test_query_is_unsupported() {
    let store = MemoryStore::new();

    let err = store.query("SELECT 1").await.unwrap_err();

    assert_eq!(err.code, Some(ErrorCode::Unsupported));
}

#[tokio::test]
async fn test_manager_flush_and_count() {
    let store = MemoryStore::new();
    store.insert("a", &json!(1), &no_opts()).await.unwrap();
    store.insert("b", &json!(2), &no_opts()).await.unwrap();

    let manager = store.manager().unwrap();
    assert_eq!(manager.item_count().await.unwrap(), 2);

    manager.flush().await.unwrap();
    assert_eq!(manager.item_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_disconnect_rejects_further_calls() {
    let store = MemoryStore::new();

    store.disconnect();

    assert!(!store.is_connected());
    assert!(store.get("k", &no_opts()).await.is_err());
}

#[tokio::test]
async fn test_set_transcoder_is_recorded() {
    let store = MemoryStore::new();
    assert_eq!(store.transcoder(), Transcoder::Json);

    store.set_transcoder(Transcoder::Utf8);

    assert_eq!(store.transcoder(), Transcoder::Utf8);
}
