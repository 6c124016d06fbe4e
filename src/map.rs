use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info_span, Instrument, Span};

use crate::codec::Codec;
use crate::dynamodb::{DynamoDb, Item, KeySchema, TableClient, TableConfig};
use crate::error::{MapError, Result};
use crate::lifecycle::TableLifecycleManager;
use crate::scan::ParallelScanner;
use crate::store::{ConditionalStore, LoadOrStored};

/// A DynamoDB table presented as a concurrent map of [`Item`]s.
///
/// The table is made ready once, in [`DynamoMap::connect`]. After that every call is a single
/// remote request, except [`DynamoMap::range_items`], which pages through the whole table.
///
/// Cloning is cheap and clones share the remote client.
///
/// # Example
///
/// ```
/// use dynamodb_map::{DynamoMap, Item, KeySchema, KeyType, LifecycleOptions, MemoryClient, TableConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), dynamodb_map::MapError> {
/// let config = TableConfig::new("people")
///     .with_key_schema(KeySchema::new("id", KeyType::Number))
///     .with_lifecycle(LifecycleOptions::default().create_if_absent(true));
/// let people = DynamoMap::connect(Arc::new(MemoryClient::new()), config).await?;
///
/// people.store(Item::new().set_int("id", 1).set_string("name", "Ada")).await?;
/// let ada = people.load(&Item::new().set_int("id", 1)).await?;
/// assert_eq!(ada.unwrap().get_string("name").map(String::as_str), Some("Ada"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DynamoMap {
    store: ConditionalStore,
    scanner: ParallelScanner,
    span: Span,
}

impl DynamoMap {
    /// Makes the table ready and returns a map over it.
    ///
    /// Fails if the table cannot be made usable: it is absent and may not be created, it is
    /// being deleted, or the remote store reported an error.
    pub async fn connect(client: Arc<dyn TableClient>, mut config: TableConfig) -> Result<Self> {
        let span = info_span!("dynamodb_map", table = %config.name());
        TableLifecycleManager::new(Arc::clone(&client))
            .ensure_ready(&mut config)
            .instrument(span.clone())
            .await?;

        let schema = config.key_schema().cloned().ok_or_else(|| {
            MapError::Fatal(format!("table `{}` is ready but has no key schema", config.name()))
        })?;
        let store = ConditionalStore::new(client, config.name(), schema, config.runtime().clone());
        Ok(Self {
            scanner: ParallelScanner::new(store.clone()),
            store,
            span,
        })
    }

    /// Connects through the AWS SDK.
    pub async fn from_sdk_config(sdk_config: &aws_config::SdkConfig, config: TableConfig) -> Result<Self> {
        Self::connect(Arc::new(DynamoDb::new(sdk_config)), config).await
    }

    /// Replaces the span that every operation of this map is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn table_name(&self) -> &str {
        self.store.table_name()
    }

    /// The key schema, as configured or discovered from the table.
    pub fn key_schema(&self) -> &KeySchema {
        self.store.key_schema()
    }

    /// Reads the item with the same key as `key`.
    pub async fn load(&self, key: &Item) -> Result<Option<Item>> {
        self.store.load(key).instrument(self.span.clone()).await
    }

    pub async fn store(&self, item: Item) -> Result<()> {
        self.store.store(item).instrument(self.span.clone()).await
    }

    /// Stores `item` unless an item with its key exists. Returns whether it was stored.
    pub async fn store_if_absent(&self, item: Item) -> Result<bool> {
        self.store
            .store_if_absent(item)
            .instrument(self.span.clone())
            .await
    }

    /// Stores `item` if the stored version attribute equals `version`. Returns whether it
    /// was stored.
    pub async fn store_if_version(&self, item: Item, version: i64) -> Result<bool> {
        self.store
            .store_if_version(item, version)
            .instrument(self.span.clone())
            .await
    }

    pub async fn load_or_store(&self, item: Item) -> Result<LoadOrStored> {
        self.store
            .load_or_store(item)
            .instrument(self.span.clone())
            .await
    }

    pub async fn delete(&self, key: &Item) -> Result<()> {
        self.store.delete(key).instrument(self.span.clone()).await
    }

    /// Calls `consumer` for every item until it returns `false`.
    ///
    /// With a scan concurrency above one, `consumer` runs on several tasks at once and items
    /// arrive in no particular order.
    pub async fn range_items<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(Item) -> bool + Send + Sync + 'static,
    {
        self.try_range_items(move |item| Ok(consumer(item))).await
    }

    /// Like [`DynamoMap::range_items`], but the consumer may fail. Its first error ends the
    /// scan and is returned.
    pub async fn try_range_items<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(Item) -> Result<bool> + Send + Sync + 'static,
    {
        self.scanner
            .range_items(consumer)
            .instrument(self.span.clone())
            .await
    }

    /// A view of this map that converts values with `codec`.
    pub fn typed<T, C: Codec<T>>(&self, codec: C) -> TypedMap<T, C> {
        TypedMap {
            map: self.clone(),
            codec: Arc::new(codec),
            _value: PhantomData,
        }
    }
}

impl fmt::Debug for DynamoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoMap")
            .field("table", &self.table_name())
            .field("key_schema", self.key_schema())
            .finish_non_exhaustive()
    }
}

/// A [`DynamoMap`] holding values of type `T`.
///
/// Key arguments are values of `T` too; only their key attributes are sent.
pub struct TypedMap<T, C> {
    map: DynamoMap,
    codec: Arc<C>,
    _value: PhantomData<fn() -> T>,
}

impl<T, C> Clone for TypedMap<T, C> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            codec: Arc::clone(&self.codec),
            _value: PhantomData,
        }
    }
}

impl<T, C: Codec<T>> TypedMap<T, C> {
    /// The untyped map underneath.
    pub fn raw(&self) -> &DynamoMap {
        &self.map
    }

    pub async fn load(&self, key: &T) -> Result<Option<T>> {
        let key = self.codec.encode(key)?;
        self.map
            .load(&key)
            .await?
            .map(|item| self.codec.decode(item))
            .transpose()
    }

    pub async fn store(&self, value: &T) -> Result<()> {
        self.map.store(self.codec.encode(value)?).await
    }

    pub async fn store_if_absent(&self, value: &T) -> Result<bool> {
        self.map.store_if_absent(self.codec.encode(value)?).await
    }

    pub async fn store_if_version(&self, value: &T, version: i64) -> Result<bool> {
        self.map
            .store_if_version(self.codec.encode(value)?, version)
            .await
    }

    pub async fn load_or_store(&self, value: &T) -> Result<LoadOrStored<T>> {
        self.map
            .load_or_store(self.codec.encode(value)?)
            .await?
            .try_map(|item| self.codec.decode(item))
    }

    pub async fn delete(&self, key: &T) -> Result<()> {
        let key = self.codec.encode(key)?;
        self.map.delete(&key).await
    }

    /// Decodes every item and feeds it to `consumer` until it returns `false`.
    ///
    /// An item that fails to decode ends the scan with a [`MapError::Codec`].
    pub async fn range<F>(&self, consumer: F) -> Result<()>
    where
        F: Fn(T) -> bool + Send + Sync + 'static,
    {
        let codec = Arc::clone(&self.codec);
        self.map
            .try_range_items(move |item| Ok(consumer(codec.decode(item)?)))
            .await
    }
}
