//! Scenario tests for the map as a whole.
//!
//! Most tests run against [`MemoryClient`] and need nothing but a tokio runtime.
//!
//! `test_live_round_trip` talks to a real endpoint and is ignored by default. To run it, set
//! the following environment variables in your `.env` file:
//!
//! ```text
//! AWS_ACCESS_KEY_ID=your_access_key
//! AWS_SECRET_ACCESS_KEY=your_secret_key
//! AWS_REGION=your_preferred_region
//! ```
//!
//! For local testing with DynamoDB Local, you can use dummy values and set:
//!
//! ```text
//! AWS_ENDPOINT_URL=http://localhost:8000
//! ```
//!
//! and then run `cargo test -- --ignored`. The live test creates a table named
//! `dynamodb-map-test` if it does not exist. It may incur AWS charges if run against a real
//! DynamoDB instance.

use crate::{
    DynamoMap, Item, KeySchema, KeyType, LifecycleOptions, LoadOrStored, MapError, MemoryClient,
    Operation, RuntimeOptions, SerdeCodec, TableConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, instrument};

const TEST_TABLE_NAME: &str = "test-people";
const ID_HASH_KEY: &str = "id";
const NAME_ATTRIBUTE: &str = "name";
const VERSION_ATTRIBUTE: &str = "version";

async fn setup_map(client: Arc<MemoryClient>, runtime: RuntimeOptions) -> DynamoMap {
    let config = TableConfig::new(TEST_TABLE_NAME)
        .with_key_schema(KeySchema::new(ID_HASH_KEY, KeyType::Number))
        .with_lifecycle(
            LifecycleOptions::default()
                .create_if_absent(true)
                .poll_interval(Duration::from_millis(1)),
        )
        .with_runtime(runtime);
    DynamoMap::connect(client, config).await.unwrap()
}

fn person(id: i64, name: &str) -> Item {
    Item::new().set_int(ID_HASH_KEY, id).set_string(NAME_ATTRIBUTE, name)
}

fn key(id: i64) -> Item {
    Item::new().set_int(ID_HASH_KEY, id)
}

#[tokio::test]
async fn test_store_load_delete_scenario() {
    let map = setup_map(Arc::new(MemoryClient::new()), RuntimeOptions::default()).await;

    map.store(person(1, "a")).await.unwrap();
    let loaded = map.load(&key(1)).await.unwrap().unwrap();
    assert_eq!(loaded.get_string(NAME_ATTRIBUTE), Some(&"a".to_string()));

    map.delete(&key(1)).await.unwrap();
    assert!(map.load(&key(1)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_extract_key_is_idempotent_for_stored_items() {
    let map = setup_map(Arc::new(MemoryClient::new()), RuntimeOptions::default()).await;
    let item = person(3, "c").set_bool("admin", true);

    let key = map.key_schema().extract_key(&item).unwrap();
    assert_eq!(map.key_schema().extract_key(&key).unwrap(), key);
    assert_eq!(key.len(), 1);

    map.store(item.clone()).await.unwrap();
    assert_eq!(map.load(&key).await.unwrap(), Some(item));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_store_if_absent_has_one_winner() {
    let map = setup_map(Arc::new(MemoryClient::new()), RuntimeOptions::default()).await;

    let first = tokio::spawn({
        let map = map.clone();
        async move { map.store_if_absent(person(2, "first")).await }
    });
    let second = tokio::spawn({
        let map = map.clone();
        async move { map.store_if_absent(person(2, "second")).await }
    });
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first ^ second, "exactly one writer must win");
    let winner = if first { "first" } else { "second" };
    let stored = map.load(&key(2)).await.unwrap().unwrap();
    assert_eq!(stored.get_string(NAME_ATTRIBUTE).map(String::as_str), Some(winner));
}

#[tokio::test]
async fn test_versioned_updates() {
    let runtime = RuntimeOptions::default().version_attribute(VERSION_ATTRIBUTE);
    let map = setup_map(Arc::new(MemoryClient::new()), runtime).await;
    map.store(person(4, "v1").set_int(VERSION_ATTRIBUTE, 1)).await.unwrap();

    let v2 = person(4, "v2").set_int(VERSION_ATTRIBUTE, 2);
    assert!(map.store_if_version(v2.clone(), 1).await.unwrap());
    // A writer still holding version 1 loses.
    let stale = person(4, "stale").set_int(VERSION_ATTRIBUTE, 2);
    assert!(!map.store_if_version(stale, 1).await.unwrap());

    assert_eq!(map.load(&key(4)).await.unwrap(), Some(v2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_load_or_store_agrees_on_one_value() {
    let map = setup_map(Arc::new(MemoryClient::new()), RuntimeOptions::default()).await;

    let mut tasks = Vec::new();
    for n in 0..8 {
        let map = map.clone();
        tasks.push(tokio::spawn(async move {
            map.load_or_store(person(5, &format!("writer{n}"))).await
        }));
    }

    let mut stored = 0;
    let mut values = Vec::new();
    for task in tasks {
        match task.await.unwrap().unwrap() {
            LoadOrStored::Stored(item) => {
                stored += 1;
                values.push(item);
            }
            LoadOrStored::Loaded(item) => values.push(item),
        }
    }

    assert_eq!(stored, 1);
    assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_range_is_complete_for_every_fan_out() {
    for workers in 1..=4 {
        let client = Arc::new(MemoryClient::new().with_page_size(3));
        let map = setup_map(client, RuntimeOptions::default().scan_concurrency(workers)).await;
        for id in 0..25 {
            map.store(person(id, "x")).await.unwrap();
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        map.range_items(move |item| {
            sink.lock().unwrap().push(item.get_int(ID_HASH_KEY).unwrap());
            true
        })
        .await
        .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..25).collect::<Vec<_>>(), "fan-out {workers}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_early_stop_delivers_at_most_one_page_per_worker() {
    let workers = 3;
    let client = Arc::new(MemoryClient::new().with_page_size(1));
    let map = setup_map(client.clone(), RuntimeOptions::default().scan_concurrency(workers)).await;
    for id in 0..30 {
        map.store(person(id, "x")).await.unwrap();
    }

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    map.range_items(move |_| counter.fetch_add(1, Ordering::SeqCst) > 0)
        .await
        .unwrap();

    let delivered = delivered.load(Ordering::SeqCst);
    assert!((1..=1 + workers).contains(&delivered), "delivered {delivered}");
    assert!(client.calls(Operation::Scan) < 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scan_error_is_reported_once() {
    let client = Arc::new(MemoryClient::new().with_page_size(2));
    let map = setup_map(client.clone(), RuntimeOptions::default().scan_concurrency(4)).await;
    for id in 0..20 {
        map.store(person(id, "x")).await.unwrap();
    }
    client.fail_scans_of_segment(1, "ProvisionedThroughputExceededException");
    client.fail_scans_of_segment(3, "InternalServerError");

    let err = map.range_items(|_| true).await.unwrap_err();
    let message = err.to_string();
    assert!(matches!(err, MapError::Remote(_)));
    assert!(
        message.contains("ProvisionedThroughputExceeded") || message.contains("InternalServerError"),
        "unexpected error: {message}"
    );
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Person {
    id: i64,
    name: String,
    #[serde(default)]
    emails: Vec<String>,
}

#[tokio::test]
async fn test_typed_range_decodes_every_value() {
    let map = setup_map(Arc::new(MemoryClient::new()), RuntimeOptions::default()).await;
    let people = map.typed(SerdeCodec::<Person>::new());
    for id in 0..5 {
        people
            .store(&Person {
                id,
                name: format!("p{id}"),
                emails: vec![format!("p{id}@example.com")],
            })
            .await
            .unwrap();
    }

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = names.clone();
    people
        .range(move |p| {
            sink.lock().unwrap().push(p.name);
            true
        })
        .await
        .unwrap();

    let mut names = names.lock().unwrap().clone();
    names.sort();
    assert_eq!(names, vec!["p0", "p1", "p2", "p3", "p4"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_typed_range_fails_on_undecodable_item() {
    let map = setup_map(
        Arc::new(MemoryClient::new()),
        RuntimeOptions::default().scan_concurrency(2),
    )
    .await;
    map.store(person(1, "fine")).await.unwrap();
    // No `name`, so it cannot become a `Person`.
    map.store(key(2)).await.unwrap();

    let err = map
        .typed(SerdeCodec::<Person>::new())
        .range(|_| true)
        .await
        .unwrap_err();
    assert!(matches!(err, MapError::Codec(_)));
}

#[tokio::test]
async fn test_ttl_is_enabled_and_stamped() {
    let client = Arc::new(MemoryClient::new());
    let runtime = RuntimeOptions::default()
        .time_to_live(Duration::from_secs(60))
        .time_to_live_attribute("expires_at");
    let map = setup_map(client.clone(), runtime).await;

    assert!(map.store_if_absent(person(9, "ephemeral")).await.unwrap());

    assert_eq!(client.time_to_live_attribute(TEST_TABLE_NAME).as_deref(), Some("expires_at"));
    let stored = map.load(&key(9)).await.unwrap().unwrap();
    assert!(stored.get_int("expires_at").is_some());
}

#[tokio::test]
#[ignore = "needs a DynamoDB endpoint and credentials"]
#[instrument]
async fn test_live_round_trip() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let sdk_config = aws_config::load_from_env().await;

    let config = TableConfig::new("dynamodb-map-test")
        .with_key_schema(KeySchema::new(ID_HASH_KEY, KeyType::Number))
        .with_lifecycle(LifecycleOptions::default().create_if_absent(true))
        .with_runtime(
            RuntimeOptions::default()
                .version_attribute(VERSION_ATTRIBUTE)
                .scan_concurrency(2),
        );
    info!("Connecting to live table");
    let map = DynamoMap::from_sdk_config(&sdk_config, config).await?;

    map.delete(&key(1)).await?;
    assert!(map.store_if_absent(person(1, "live").set_int(VERSION_ATTRIBUTE, 1)).await?);
    assert!(!map.store_if_absent(person(1, "again")).await?);
    assert!(map.store_if_version(person(1, "live2").set_int(VERSION_ATTRIBUTE, 2), 1).await?);

    let loaded = map.load(&key(1)).await?.expect("item was just stored");
    assert_eq!(loaded.get_string(NAME_ATTRIBUTE), Some(&"live2".to_string()));

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    map.range_items(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        true
    })
    .await?;
    assert!(seen.load(Ordering::SeqCst) >= 1);

    map.delete(&key(1)).await?;
    info!("Live test completed successfully");
    Ok(())
}
