use aws_sdk_dynamodb::types::AttributeValue;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use crate::dynamodb::{
    Condition, Item, KeySchema, RuntimeOptions, ScanPage, ScanRequest, StoreError, TableClient,
};
use crate::error::{MapError, Result};
use crate::scan::ScanCursor;

/// Outcome of [`ConditionalStore::load_or_store`]: exactly one of the two happened.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOrStored<T = Item> {
    /// An item with the same key already existed and is returned unchanged.
    Loaded(T),
    /// No item existed and the given one was written.
    Stored(T),
}

impl<T> LoadOrStored<T> {
    pub fn loaded(&self) -> bool {
        matches!(self, LoadOrStored::Loaded(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            LoadOrStored::Loaded(v) | LoadOrStored::Stored(v) => v,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadOrStored<U> {
        match self {
            LoadOrStored::Loaded(v) => LoadOrStored::Loaded(f(v)),
            LoadOrStored::Stored(v) => LoadOrStored::Stored(f(v)),
        }
    }

    pub(crate) fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<LoadOrStored<U>> {
        Ok(match self {
            LoadOrStored::Loaded(v) => LoadOrStored::Loaded(f(v)?),
            LoadOrStored::Stored(v) => LoadOrStored::Stored(f(v)?),
        })
    }
}

/// Single-item reads and writes, including the conditional writes that emulate
/// compare-and-swap on top of DynamoDB's conditional puts.
///
/// A failed condition is an answer, not an error: conditional methods return `Ok(false)`.
/// Every other remote failure is returned as-is and not retried.
#[derive(Clone)]
pub struct ConditionalStore {
    client: Arc<dyn TableClient>,
    table: Arc<str>,
    schema: KeySchema,
    options: RuntimeOptions,
}

impl ConditionalStore {
    pub fn new(
        client: Arc<dyn TableClient>,
        table: impl Into<Arc<str>>,
        schema: KeySchema,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            schema,
            options,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn key_schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Reads the item with the same key as `key`. Any non-key attributes are ignored.
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn load(&self, key: &Item) -> Result<Option<Item>> {
        let key = self.schema.extract_key(key)?;
        let found = self
            .client
            .get_item(&self.table, key, self.options.consistent_reads)
            .await?;
        debug!(found = found.is_some(), "load");
        Ok(found)
    }

    /// Writes `item`, replacing any item with the same key.
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn store(&self, item: Item) -> Result<()> {
        self.put(item, None).await?;
        Ok(())
    }

    /// Writes `item` only if no item with its key exists. Returns whether it was written.
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn store_if_absent(&self, item: Item) -> Result<bool> {
        let condition = Condition::AttributeNotExists(self.schema.hash_key().to_string());
        self.put_if(item, condition).await
    }

    /// Writes `item` only if the stored item's version attribute equals `version`.
    ///
    /// The version attribute of `item` itself is written as given; bumping it is up to
    /// the caller.
    #[instrument(skip_all, fields(table = %self.table, version = version))]
    pub async fn store_if_version(&self, item: Item, version: i64) -> Result<bool> {
        let attribute = self.options.version_attribute.as_deref().ok_or_else(|| {
            MapError::InvalidConfig("store_if_version requires a version attribute".into())
        })?;
        let condition =
            Condition::AttributeEquals(attribute.to_string(), AttributeValue::N(version.to_string()));
        self.put_if(item, condition).await
    }

    /// Returns the stored item with the same key as `item`, or stores `item` if there is none.
    ///
    /// Loads and conditional stores alternate until one succeeds. A store can lose to a
    /// concurrent writer and the winner can be deleted before the next load, so the loop is
    /// capped; after `max_load_or_store_attempts` rounds it fails with
    /// [`MapError::Contention`].
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn load_or_store(&self, item: Item) -> Result<LoadOrStored> {
        let attempts = self.options.max_load_or_store_attempts.max(1);
        let item = self.stamp(item)?;
        for attempt in 1..=attempts {
            if let Some(existing) = self.load(&item).await? {
                return Ok(LoadOrStored::Loaded(existing));
            }
            if self.put_stamped(item.clone(), Some(self.absent_condition())).await? {
                return Ok(LoadOrStored::Stored(item));
            }
            debug!(attempt, "lost insert race, loading again");
        }
        warn!(attempts, "giving up on contended load_or_store");
        Err(MapError::Contention { attempts })
    }

    /// Deletes the item with the same key as `key`. Deleting a missing item succeeds.
    #[instrument(skip_all, fields(table = %self.table))]
    pub async fn delete(&self, key: &Item) -> Result<()> {
        let key = self.schema.extract_key(key)?;
        self.client.delete_item(&self.table, key).await?;
        Ok(())
    }

    /// Fetches the next page for `cursor`.
    pub(crate) async fn fetch_page(&self, cursor: &ScanCursor) -> Result<ScanPage> {
        let request = ScanRequest {
            table: self.table.to_string(),
            consistent: self.options.consistent_reads,
            segment: cursor.segment(),
            exclusive_start_key: cursor.exclusive_start_key().cloned(),
            limit: self.options.scan_page_size,
        };
        Ok(self.client.scan(&request).await?)
    }

    fn absent_condition(&self) -> Condition {
        Condition::AttributeNotExists(self.schema.hash_key().to_string())
    }

    async fn put_if(&self, item: Item, condition: Condition) -> Result<bool> {
        self.put(item, Some(condition)).await
    }

    /// Validates, stamps and writes. `Ok(false)` means the condition did not hold.
    async fn put(&self, item: Item, condition: Option<Condition>) -> Result<bool> {
        let item = self.stamp(item)?;
        self.put_stamped(item, condition).await
    }

    async fn put_stamped(&self, item: Item, condition: Option<Condition>) -> Result<bool> {
        let conditional = condition.is_some();
        match self.client.put_item(&self.table, item, condition).await {
            Ok(()) => Ok(true),
            Err(StoreError::ConditionFailed) if conditional => {
                debug!("condition not met");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Rejects items without a hash key and sets the expiry attribute when TTL is on.
    fn stamp(&self, mut item: Item) -> Result<Item> {
        if !item.exists(self.schema.hash_key()) {
            return Err(MapError::MissingKeyAttribute(self.schema.hash_key().to_string()));
        }
        if let Some(attribute) = self.options.ttl_attribute() {
            let expires_at = SystemTime::now()
                .checked_add(self.options.time_to_live)
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .ok_or_else(|| MapError::InvalidConfig("time to live overflows the clock".into()))?;
            item.insert(attribute, AttributeValue::N(expires_at.as_secs().to_string()));
        }
        Ok(item)
    }
}
