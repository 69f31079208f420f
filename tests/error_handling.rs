//! Error handling and edge case tests.

use docbind::{
    Binding, CollectionRef, DocumentBinding, DocumentWrite, DropReason, Fetcher, FilterOp,
    MemoryStore, Query, QueryBinding, StoreError, SubscriptionConfig, TypeConverter,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Admin {
    email: String,
}

fn admins() -> CollectionRef {
    CollectionRef::new("admins").unwrap()
}

fn put(store: &MemoryStore, id: &str, data: serde_json::Value) {
    store
        .set(&admins().doc(id).unwrap(), DocumentWrite::from_value(data).unwrap())
        .unwrap();
}

fn binding(store: &MemoryStore) -> QueryBinding<Admin, u32> {
    Binding::new(Arc::new(store.clone()), TypeConverter::serde())
}

// --- Registration Failures ---

#[test]
fn test_denied_listen_propagates_and_allows_retry() {
    let store = MemoryStore::new();
    put(&store, "a1", json!({ "email": "a@example.com" }));
    store.deny("admins");

    let mut admins_binding = binding(&store);
    let result = admins_binding.bind(Some(Query::collection("admins").unwrap()), 1);
    assert!(matches!(result, Err(StoreError::PermissionDenied(_))));
    assert!(!admins_binding.is_live());
    assert!(!admins_binding.is_initialized());
    assert_eq!(store.listener_count(), 0);

    // Same dependencies retry, since the failed bind recorded nothing.
    store.allow("admins");
    let state = admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 1)
        .unwrap();
    assert!(state.initialized);
    assert_eq!(state.value.map(Vec::len), Some(1));
}

#[test]
fn test_failed_rebind_clears_previous_value() {
    let store = MemoryStore::new();
    put(&store, "a1", json!({ "email": "a@example.com" }));

    let mut admins_binding = binding(&store);
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 0)
        .unwrap();
    assert_eq!(admins_binding.value().map(Vec::len), Some(1));

    store.set_offline(true);
    let result = admins_binding
        .bind(Some(Query::collection("books").unwrap()), 1)
        .map(|_| ());
    assert!(matches!(result, Err(StoreError::Unavailable(_))));

    let state = admins_binding.state();
    assert_eq!(state.value, None);
    assert_eq!(state.error, None);
    assert!(state.initialized);
    assert!(!admins_binding.is_live());
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_denied_document_path_is_covered_by_collection_rule() {
    let store = MemoryStore::new();
    store.deny("admins");

    let mut doc_binding: DocumentBinding<Admin> =
        Binding::new(Arc::new(store.clone()), TypeConverter::serde());
    let result = doc_binding.bind(Some(admins().doc("a1").unwrap()), ());
    assert!(matches!(result, Err(StoreError::PermissionDenied(ref p)) if p == "admins/a1"));

    // A sibling prefix is not covered.
    let mut other: DocumentBinding<Admin> =
        Binding::new(Arc::new(store.clone()), TypeConverter::serde());
    assert!(other
        .bind(Some(CollectionRef::new("admins2").unwrap().doc("x").unwrap()), ())
        .is_ok());
}

#[test]
fn test_invalid_query_is_rejected_at_bind() {
    let store = MemoryStore::new();
    let query = Query::collection("admins")
        .unwrap()
        .where_field("email", FilterOp::In, json!([]));

    let result = binding(&store).bind(Some(query), 1).map(|_| ());
    assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    assert_eq!(store.listener_count(), 0);
}

#[tokio::test]
async fn test_offline_store_fails_one_shot_reads() {
    let store = MemoryStore::new();
    store.set_offline(true);
    let fetcher = Fetcher::new(Arc::new(store.clone()));

    let err = fetcher
        .fetch_document(&admins().doc("a1").unwrap(), &TypeConverter::<Admin>::serde())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(store.read_count(), 0);
}

// --- Mid-Stream Failures ---

#[test]
fn test_mid_stream_failure_is_surfaced() {
    let store = MemoryStore::new();
    put(&store, "a1", json!({ "email": "a@example.com" }));

    let mut admins_binding = binding(&store);
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 1)
        .unwrap();

    let failed = store.fail_listeners("admins", DropReason::Error("backend restarted".into()));
    assert_eq!(failed, 1);
    admins_binding.poll();

    let state = admins_binding.state();
    assert_eq!(
        state.error,
        Some(&StoreError::SubscriptionDropped(DropReason::Error(
            "backend restarted".into()
        )))
    );
    // Last value is kept and the flag is untouched.
    assert_eq!(state.value.map(Vec::len), Some(1));
    assert!(state.initialized);
    assert!(!admins_binding.is_live());

    // Later writes do not reach the dead binding.
    put(&store, "a2", json!({ "email": "b@example.com" }));
    assert_eq!(admins_binding.poll(), 0);
    assert_eq!(admins_binding.value().map(Vec::len), Some(1));

    // Retrying is the caller's call.
    admins_binding.unbind();
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 1)
        .unwrap();
    assert_eq!(admins_binding.error(), None);
    assert_eq!(admins_binding.value().map(Vec::len), Some(2));
}

#[test]
fn test_revoked_access_terminates_listener() {
    let store = MemoryStore::new();
    let mut admins_binding = binding(&store);
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 1)
        .unwrap();

    assert_eq!(store.deny("admins"), 1);
    admins_binding.poll();
    assert!(matches!(
        admins_binding.error(),
        Some(StoreError::SubscriptionDropped(DropReason::PermissionDenied(_)))
    ));
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_slow_consumer_is_dropped() {
    let store = MemoryStore::new();
    let mut admins_binding: QueryBinding<Admin> = Binding::with_config(
        Arc::new(store.clone()),
        TypeConverter::serde(),
        SubscriptionConfig { buffer_size: 2 },
    );
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), ())
        .unwrap();

    // Never polled while the store keeps writing.
    for i in 0..5 {
        put(&store, &format!("a{i}"), json!({ "email": format!("{i}@example.com") }));
    }
    assert_eq!(store.listener_count(), 0);

    admins_binding.poll();
    assert_eq!(
        admins_binding.error(),
        Some(&StoreError::SubscriptionDropped(DropReason::BufferOverflow))
    );
    // The buffered snapshots were still applied before the drop notice.
    assert_eq!(admins_binding.value().map(Vec::len), Some(2));
}

#[test]
fn test_decode_failure_keeps_listening() {
    let store = MemoryStore::new();
    put(&store, "a1", json!({ "email": "a@example.com" }));

    let mut admins_binding = binding(&store);
    admins_binding
        .bind(Some(Query::collection("admins").unwrap()), 1)
        .unwrap();

    put(&store, "a2", json!({ "email": 42 }));
    admins_binding.poll();
    assert!(matches!(
        admins_binding.error(),
        Some(StoreError::Decode { id, .. }) if id.as_str() == "a2"
    ));
    assert!(admins_binding.is_live());
    assert_eq!(admins_binding.value().map(Vec::len), Some(1));

    put(&store, "a2", json!({ "email": "fixed@example.com" }));
    admins_binding.poll();
    assert_eq!(admins_binding.error(), None);
    assert_eq!(admins_binding.value().map(Vec::len), Some(2));
}

// --- Write Errors ---

#[test]
fn test_update_missing_document() {
    let store = MemoryStore::new();
    let result = store.update(
        &admins().doc("ghost").unwrap(),
        DocumentWrite::from_value(json!({ "email": "x" })).unwrap(),
    );
    assert_eq!(result, Err(StoreError::NotFound("admins/ghost".into())));
}

#[test]
fn test_absent_data_is_never_an_error() {
    let store = MemoryStore::new();
    let mut doc_binding: DocumentBinding<Admin> =
        Binding::new(Arc::new(store.clone()), TypeConverter::serde());
    let state = doc_binding
        .bind(Some(admins().doc("nobody").unwrap()), ())
        .unwrap();
    assert_eq!(state.value, None);
    assert_eq!(state.error, None);
    assert!(state.initialized);
}
