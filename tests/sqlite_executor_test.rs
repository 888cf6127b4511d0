//! Integration tests running the executor against a real SQLite file.

use chrono::NaiveDate;
use db_datastore::config::PoolDefinition;
use db_datastore::db::{
    AccessMode, BoundValue, DriverConnection, KeyRetrieval, PoolRegistry, SqlType, ValuesParser,
    decoders, fill_statement,
};
use db_datastore::error::DbError;
use db_datastore::models::{SqlValue, Statement};
use tempfile::NamedTempFile;

struct Event {
    name: &'static str,
    happened_at: Option<chrono::NaiveDateTime>,
}

async fn setup() -> (PoolRegistry, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let registry = PoolRegistry::new();
    let definition = PoolDefinition::new("local", format!("sqlite:{}", db_path), "sa", "sa");
    let summary = registry.initialize(&[definition]).await;
    assert!(summary.is_success(), "pool creation failed: {:?}", summary.failed);

    let mut executor = registry.acquire_tx_executor("local").await.unwrap();
    executor
        .persist_or_update(&Statement::from(
            "CREATE TABLE events (id INTEGER PRIMARY KEY, name TEXT NOT NULL, happened_at DATETIME)",
        ))
        .await
        .expect("CREATE TABLE should work");
    executor.close_quietly().await;

    (registry, temp_file)
}

fn events() -> Vec<Event> {
    let at = NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(7, 8, 9)
        .unwrap();
    vec![
        Event {
            name: "deploy",
            happened_at: Some(at),
        },
        Event {
            name: "rollback",
            happened_at: None,
        },
        Event {
            name: "restart",
            happened_at: Some(at + chrono::Duration::hours(1)),
        },
    ]
}

async fn count(registry: &PoolRegistry) -> i64 {
    let mut executor = registry.acquire_executor("local").await.unwrap();
    let total = executor
        .query_one(&Statement::from("SELECT COUNT(*) FROM events"), &decoders::INTEGER)
        .await
        .unwrap();
    executor.close_quietly().await;
    total.flatten().unwrap_or(0)
}

#[tokio::test]
async fn test_batch_insert_and_map_list() {
    let (registry, _file) = setup().await;

    let parser = ValuesParser::new(
        "INSERT INTO events (name, happened_at) VALUES (?, ?)",
        |event: &Event| vec![SqlValue::from(event.name), SqlValue::from(event.happened_at)],
    );

    let mut executor = registry.acquire_tx_executor("local").await.unwrap();
    let inserted = executor.persist_batch(&events(), &parser).await.unwrap();
    assert_eq!(inserted, 3);

    let rows = executor
        .query_map_list(&Statement::from(
            "SELECT id, name, happened_at FROM events ORDER BY id",
        ))
        .await
        .unwrap();
    executor.close_quietly().await;

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["id"].as_deref(), Some("1"));
    assert_eq!(rows[0]["name"].as_deref(), Some("deploy"));
    assert_eq!(rows[0]["happened_at"].as_deref(), Some("2024-05-06 07:08:09"));
    assert_eq!(rows[1]["happened_at"], None);
    assert_eq!(rows[2]["happened_at"].as_deref(), Some("2024-05-06 08:08:09"));

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_generated_key_and_typed_queries() {
    let (registry, _file) = setup().await;

    let mut executor = registry.acquire_tx_executor("local").await.unwrap();
    let first = executor
        .persist_and_get_key(&Statement::new(
            "INSERT INTO events (name) VALUES (?)",
            vec![SqlValue::from("first")],
        ))
        .await
        .unwrap();
    let second = executor
        .persist_and_get_key(&Statement::new(
            "INSERT INTO events (name) VALUES (?)",
            vec![SqlValue::from("second")],
        ))
        .await
        .unwrap();
    assert_eq!(first, vec![1]);
    assert_eq!(second, vec![2]);

    let name = executor
        .query_one(
            &Statement::new("SELECT name FROM events WHERE id = ?", vec![SqlValue::Int(2)]),
            &decoders::TEXT,
        )
        .await
        .unwrap();
    assert_eq!(name, Some(Some("second".to_string())));

    let ids = executor
        .query_list(&Statement::from("SELECT id FROM events ORDER BY id"), &decoders::INTEGER)
        .await
        .unwrap();
    assert_eq!(ids, vec![Some(1), Some(2)]);

    let err = executor
        .persist_and_get_key(&Statement::from("DELETE FROM events"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotAnInsert));
    executor.close_quietly().await;

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_transaction_rollback_and_commit() {
    let (registry, _file) = setup().await;

    let mut executor = registry
        .acquire_executor_with("local", AccessMode::Transactional)
        .await
        .unwrap();
    executor
        .persist_or_update(&Statement::from("INSERT INTO events (name) VALUES ('discarded')"))
        .await
        .unwrap();
    executor.rollback_and_close().await;
    assert_eq!(count(&registry).await, 0);

    let mut executor = registry
        .acquire_executor_with("local", AccessMode::Transactional)
        .await
        .unwrap();
    let counts = executor
        .persist_or_update_all(&[
            Statement::from("INSERT INTO events (name) VALUES ('a')"),
            Statement::from("INSERT INTO events (name) VALUES ('b')"),
        ])
        .await
        .unwrap();
    assert_eq!(counts, vec![1, 1]);
    executor.commit_and_close().await;
    assert_eq!(count(&registry).await, 2);

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_uncommitted_work_is_discarded_on_close() {
    let (registry, _file) = setup().await;

    let mut executor = registry
        .acquire_executor_with("local", AccessMode::Transactional)
        .await
        .unwrap();
    executor
        .persist_or_update(&Statement::from("INSERT INTO events (name) VALUES ('pending')"))
        .await
        .unwrap();
    executor.close_quietly().await;

    assert_eq!(count(&registry).await, 0);

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_read_only_executor_rejects_writes() {
    let (registry, _file) = setup().await;

    let mut executor = registry.acquire_executor("local").await.unwrap();
    let result = executor
        .persist_or_update(&Statement::from("INSERT INTO events (name) VALUES ('blocked')"))
        .await;
    executor.close_quietly().await;
    assert!(matches!(result, Err(DbError::Execution { .. })));

    // Read-only mode is cleared when the connection goes back to the pool.
    let mut executor = registry.acquire_tx_executor("local").await.unwrap();
    executor
        .persist_or_update(&Statement::from("INSERT INTO events (name) VALUES ('allowed')"))
        .await
        .unwrap();
    executor.close_quietly().await;
    assert_eq!(count(&registry).await, 1);

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_parameter_count_checked_before_execution() {
    let (registry, _file) = setup().await;

    let mut executor = registry.acquire_executor("local").await.unwrap();
    let err = executor
        .query_map_list(&Statement::new(
            "SELECT id FROM events WHERE id = ? AND name = ?",
            vec![SqlValue::Int(1)],
        ))
        .await
        .unwrap_err();
    executor.close_quietly().await;

    assert!(matches!(
        err,
        DbError::ParameterCountMismatch {
            expected: 2,
            actual: 1
        }
    ));

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_oversized_initial_size_is_clamped_not_fatal() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();

    // SQLite pools default to a single connection.
    let definition = PoolDefinition::new("warm", format!("sqlite:{}", db_path), "sa", "sa")
        .with_option("initial_size", "2")
        .with_option("max_wait_ms", "500");

    let registry = PoolRegistry::new();
    let summary = registry.initialize(&[definition]).await;

    assert!(summary.is_success(), "pool creation failed: {:?}", summary.failed);
    assert_eq!(summary.registered, vec!["warm"]);
    assert_eq!(summary.diagnostics.len(), 1);
    assert_eq!(summary.diagnostics[0].0, "warm");
    assert_eq!(summary.diagnostics[0].1.option, "initial_size");

    let mut executor = registry.acquire_executor("warm").await.unwrap();
    let one = executor
        .query_one(&Statement::from("SELECT 1"), &decoders::INTEGER)
        .await
        .unwrap();
    executor.close_quietly().await;
    assert_eq!(one, Some(Some(1)));

    registry.destroy_all().await;
}

#[tokio::test]
async fn test_sqlite_slots_are_untyped_and_bind_as_is() {
    let (registry, _file) = setup().await;

    let mut conn = registry.acquire_tx_connection("local").await.unwrap();
    let mut prepared = conn
        .prepare("SELECT id FROM events WHERE happened_at > ? AND name = ?", KeyRetrieval::Skip)
        .await
        .unwrap();
    assert_eq!(prepared.parameter_count(), 2);
    assert_eq!(prepared.parameter_type(0), SqlType::Unknown);

    fill_statement(
        &mut prepared,
        &[SqlValue::from("2024-05-06 07:08:09"), SqlValue::Null],
    )
    .unwrap();
    assert_eq!(
        prepared.bound_values().unwrap(),
        vec![
            BoundValue::Value(SqlValue::from("2024-05-06 07:08:09")),
            BoundValue::Null(SqlType::Unknown),
        ]
    );

    let cursor = conn.execute_query(&prepared).await.unwrap();
    assert_eq!(cursor.count(), 0);
    conn.close().await.unwrap();

    registry.destroy_all().await;
}
