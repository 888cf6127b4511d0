//! Integration tests for the pool registry lifecycle.

mod common;

use common::{FakeFactory, Script, definition};
use db_datastore::db::{AccessMode, DriverConnection, PoolRegistry};
use db_datastore::error::DbError;
use rand::seq::SliceRandom;
use rand::{Rng, thread_rng};
use std::time::Duration;

#[tokio::test]
async fn test_initialize_skips_disabled_and_invalid_definitions() {
    let factory = FakeFactory::new(Script::default());
    let registry = PoolRegistry::with_factory(factory.clone());

    let definitions = vec![
        definition("orders"),
        definition("archive").enabled(false),
        definition("broken").with_option("max_active", "not-a-number"),
        db_datastore::config::PoolDefinition::new("nopass", "mysql://localhost/db", "app", ""),
        definition("analytics"),
    ];
    let summary = registry.initialize(&definitions).await;

    assert_eq!(summary.registered, vec!["orders", "broken", "analytics"]);
    assert_eq!(summary.disabled, vec!["archive"]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "nopass");
    assert!(matches!(summary.failed[0].1, DbError::Configuration { .. }));
    assert!(!summary.is_success());

    // Bad tuning values fall back to defaults and are reported.
    assert_eq!(summary.diagnostics.len(), 1);
    assert_eq!(summary.diagnostics[0].0, "broken");
    assert_eq!(summary.diagnostics[0].1.option, "max_active");

    assert_eq!(registry.list_ids().await, vec!["analytics", "broken", "orders"]);
    assert!(!registry.contains("archive").await);
    assert_eq!(factory.construction_count(), 3);
}

#[tokio::test]
async fn test_initialize_is_additive() {
    let factory = FakeFactory::new(Script::default());
    let registry = PoolRegistry::with_factory(factory.clone());

    registry.initialize(&[definition("a")]).await;
    let summary = registry.initialize(&[definition("a"), definition("b")]).await;

    assert_eq!(summary.registered, vec!["b"]);
    assert_eq!(summary.already_present, vec!["a"]);
    assert_eq!(registry.list_ids().await, vec!["a", "b"]);
    assert_eq!(factory.construction_count(), 2);
}

#[tokio::test]
async fn test_duplicate_ids_in_one_call_construct_once() {
    let factory = FakeFactory::new(Script::default());
    let registry = PoolRegistry::with_factory(factory.clone());

    let summary = registry
        .initialize(&[definition("dup"), definition(" dup ")])
        .await;

    assert_eq!(summary.registered, vec!["dup"]);
    assert_eq!(summary.already_present, vec!["dup"]);
    assert_eq!(factory.construction_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_initialize_constructs_one_pool_per_id() {
    let factory = FakeFactory::new(Script::default()).with_delay(Duration::from_millis(30));
    let registry = PoolRegistry::with_factory(factory.clone());
    let ids = ["alpha", "beta", "gamma"];

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        let mut definitions: Vec<_> = ids.iter().map(|id| definition(id)).collect();
        definitions.shuffle(&mut thread_rng());
        let jitter = Duration::from_millis(thread_rng().gen_range(0..10));
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            registry.initialize(&definitions).await
        }));
    }

    let mut registered = 0;
    for handle in handles {
        let summary = handle.await.unwrap();
        assert!(summary.is_success());
        registered += summary.registered.len();
    }

    assert_eq!(registered, ids.len());
    assert_eq!(factory.construction_count(), ids.len());
    assert_eq!(registry.list_ids().await, vec!["alpha", "beta", "gamma"]);
}

#[tokio::test]
async fn test_failed_construction_leaves_no_entry() {
    let factory = FakeFactory::new(Script::default()).failing(&["down"]);
    let registry = PoolRegistry::with_factory(factory.clone());

    let summary = registry.initialize(&[definition("down"), definition("up")]).await;

    assert_eq!(summary.registered, vec!["up"]);
    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(summary.failed[0].1, DbError::Connection { .. }));
    assert_eq!(registry.list_ids().await, vec!["up"]);

    let err = registry.acquire_connection("down").await.unwrap_err();
    assert!(matches!(err, DbError::PoolNotFound { .. }));
}

#[tokio::test]
async fn test_unknown_pool() {
    let registry = PoolRegistry::with_factory(FakeFactory::new(Script::default()));

    let err = registry.acquire_connection("missing").await.unwrap_err();
    assert!(matches!(err, DbError::PoolNotFound { ref pool_id } if pool_id == "missing"));

    let err = registry.acquire_executor("missing").await.err().unwrap();
    assert!(matches!(err, DbError::PoolNotFound { .. }));
}

#[tokio::test]
async fn test_access_modes() {
    let (registry, _factory) = common::registry(Script::default()).await;

    let mut conn = registry.acquire_connection("main").await.unwrap();
    assert!(conn.is_read_only());
    assert!(conn.is_auto_commit());
    conn.close().await.unwrap();

    let mut conn = registry.acquire_tx_connection("main").await.unwrap();
    assert!(!conn.is_read_only());
    assert!(conn.is_auto_commit());
    conn.close().await.unwrap();

    let mut conn = registry
        .acquire_with("main", AccessMode::Transactional)
        .await
        .unwrap();
    assert!(!conn.is_read_only());
    assert!(!conn.is_auto_commit());
    conn.set_auto_commit(true).await.unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_destroy() {
    let factory = FakeFactory::new(Script::default());
    let registry = PoolRegistry::with_factory(factory.clone());
    registry.initialize(&[definition("a"), definition("b")]).await;

    registry.destroy("a").await;
    registry.destroy("a").await;
    registry.destroy("never-registered").await;

    assert_eq!(registry.list_ids().await, vec!["b"]);
    assert_eq!(factory.journal().pool_closes, vec!["a"]);
    assert!(matches!(
        registry.acquire_connection("a").await.unwrap_err(),
        DbError::PoolNotFound { .. }
    ));
}

#[tokio::test]
async fn test_destroy_all_then_reinitialize() {
    let factory = FakeFactory::new(Script::default());
    let registry = PoolRegistry::with_factory(factory.clone());
    registry.initialize(&[definition("a"), definition("b")]).await;

    registry.destroy_all().await;
    assert!(registry.list_ids().await.is_empty());

    let mut closed = factory.journal().pool_closes.clone();
    closed.sort();
    assert_eq!(closed, vec!["a", "b"]);

    let summary = registry.initialize(&[definition("a")]).await;
    assert_eq!(summary.registered, vec!["a"]);
    assert_eq!(registry.list_ids().await, vec!["a"]);
}

#[tokio::test]
async fn test_destroy_during_construction_closes_new_pool() {
    let factory = FakeFactory::new(Script::default()).with_delay(Duration::from_millis(100));
    let registry = PoolRegistry::with_factory(factory.clone());

    let init = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.initialize(&[definition("slow")]).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    registry.destroy("slow").await;

    let summary = init.await.unwrap();
    assert!(summary.registered.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(summary.failed[0].1, DbError::PoolNotFound { .. }));

    assert!(registry.list_ids().await.is_empty());
    assert_eq!(factory.journal().pool_closes, vec!["slow"]);
}
