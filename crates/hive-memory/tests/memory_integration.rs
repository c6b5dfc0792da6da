#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the hive-memory crate.
//!
//! Covers FileStore persistence, namespace isolation, TTL expiry across
//! reopen, recursive pattern queries, agent-scoped keys under concurrency,
//! and session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use hive_core::{ObjectiveId, ObjectiveStatus};
use hive_memory::{
    scoped_key, CoordinationStore, CoordinationStoreExt, FileStore, InMemoryStore, Namespace,
    PatternOutcome, QueryFilter, Session,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ns(path: &str) -> Namespace {
    Namespace::parse(path).unwrap()
}

// ---------------------------------------------------------------------------
// 1. FileStore persistence with mixed writes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn file_store_persistence() {
    let tmp: TempDir = TempDir::new().unwrap();
    let path = tmp.path().join("memory.jsonl");
    let objective = ObjectiveId::new();

    {
        let store = FileStore::open(&path).await.unwrap();
        store
            .put_json(&Namespace::objective(objective), "status", &"running", None)
            .await
            .unwrap();
        store
            .store(
                &Namespace::objective_results(objective),
                "architect",
                json!({"design": "two tables"}),
                None,
            )
            .await
            .unwrap();
        store
            .put_json(&Namespace::objective(objective), "status", &"completed", None)
            .await
            .unwrap();
    }

    let store = FileStore::open(&path).await.unwrap();
    let status: Option<String> = store
        .get_json(&Namespace::objective(objective), "status")
        .await
        .unwrap();
    assert_eq!(status.as_deref(), Some("completed"));

    let results = store
        .query(
            &Namespace::objective(objective),
            &QueryFilter::new().recursive(),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
}

// ---------------------------------------------------------------------------
// 2. TTL expiry survives reopen
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ttl_expiry_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memory.jsonl");

    {
        let store = FileStore::open(&path).await.unwrap();
        store
            .store(&ns("sessions/x"), "lease", json!(1), Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store
            .store(&ns("sessions/x"), "durable", json!(2), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let store = FileStore::open(&path).await.unwrap();
    assert!(store.get(&ns("sessions/x"), "lease").await.unwrap().is_none());
    assert!(store.get(&ns("sessions/x"), "durable").await.unwrap().is_some());
    assert_eq!(store.purge_expired().await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// 3. Namespace isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_key_different_namespaces_are_independent() {
    let store = InMemoryStore::new();
    store.store(&ns("agents/a"), "draft", json!("a"), None).await.unwrap();
    store.store(&ns("agents/b"), "draft", json!("b"), None).await.unwrap();

    assert!(store.delete(&ns("agents/a"), "draft").await.unwrap());
    let b = store.get(&ns("agents/b"), "draft").await.unwrap().unwrap();
    assert_eq!(b.value, json!("b"));
}

// ---------------------------------------------------------------------------
// 4. Pattern lookup across task types
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pattern_lookup_across_task_types() {
    let store = InMemoryStore::new();
    store
        .store(
            &Namespace::pattern(PatternOutcome::Success, "widget_development"),
            "abc123",
            json!({"task_type": "widget_development"}),
            None,
        )
        .await
        .unwrap();
    store
        .store(
            &Namespace::pattern(PatternOutcome::Failure, "widget_development"),
            "abc123::css",
            json!({"kind": "timeout"}),
            None,
        )
        .await
        .unwrap();

    let hits = store
        .query(
            &Namespace::patterns(PatternOutcome::Success),
            &QueryFilter::new().recursive().key_prefix("abc123"),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value["task_type"], "widget_development");
}

// ---------------------------------------------------------------------------
// 5. Agent-scoped keys do not collide under concurrency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scoped_keys_under_concurrent_file_writes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memory.jsonl");
    let store = Arc::new(FileStore::open(&path).await.unwrap());
    let shared = ns("objectives/shared");

    let mut handles = Vec::new();
    for agent in 0..8 {
        let store = store.clone();
        let shared = shared.clone();
        handles.push(tokio::spawn(async move {
            for step in 0..5 {
                store
                    .store(&shared, &scoped_key(agent, "progress"), json!(step), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let entries = store.query(&shared, &QueryFilter::new()).await.unwrap();
    assert_eq!(entries.len(), 8);
    assert!(entries.iter().all(|e| e.value == json!(4)));

    let reopened = FileStore::open(&path).await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 8);
}

// ---------------------------------------------------------------------------
// 6. Session lifecycle over a file store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_lifecycle_over_file_store() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memory.jsonl");
    let store: Arc<dyn CoordinationStore> = Arc::new(FileStore::open(&path).await.unwrap());

    let session = Session::open(store.clone()).await.unwrap();
    let session_id = session.id();
    let objective = ObjectiveId::new();
    session
        .record_objective(objective, ObjectiveStatus::Failed)
        .await
        .unwrap();
    session.close().await.unwrap();

    let reopened = FileStore::open(&path).await.unwrap();
    let entries = reopened
        .query(&Namespace::session(session_id), &QueryFilter::new())
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}
