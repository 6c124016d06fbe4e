use anyhow::Result;
use dynamodb_map::{logging, DynamoDb, DynamoMap, Item, KeyType, TableConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

const DEBUG_VAR: &str = "DYNAMODB_MAP_DEBUG";
const MARKER_KEY: &str = "dynamodb-map-demo";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let debug = std::env::var(DEBUG_VAR).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    logging::init_logging(debug)?;

    let sdk_config = aws_config::load_from_env().await;
    let ddb = DynamoDb::new(&sdk_config);
    ddb.check_auth().await?;

    let config = TableConfig::from_env()?;
    let map = DynamoMap::connect(Arc::new(ddb), config).await?;
    let schema = map.key_schema();
    info!(
        "Using table '{}' (hash key '{}', range key {:?})",
        map.table_name(),
        schema.hash_key(),
        schema.range_key()
    );

    if schema.hash().key_type == KeyType::String && !schema.is_ranged() {
        let marker = Item::new()
            .set_string(schema.hash_key(), MARKER_KEY)
            .set_string("written_by", env!("CARGO_PKG_NAME"));
        let stored = map.load_or_store(marker).await?;
        info!("Marker item {}", if stored.loaded() { "already present" } else { "stored" });
    }

    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    map.range_items(move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
        true
    })
    .await?;
    info!("Table '{}' holds {} items", map.table_name(), count.load(Ordering::Relaxed));

    Ok(())
}
