//! # dynamodb-map
//!
//! A DynamoDB table presented as a concurrent, map-like collection.
//!
//! [`DynamoMap`] offers load, store and delete by key, optimistic-concurrency writes built on
//! DynamoDB's conditional puts ([`DynamoMap::store_if_absent`],
//! [`DynamoMap::store_if_version`], [`DynamoMap::load_or_store`]) and full-table enumeration
//! with an optional parallel segmented scan ([`DynamoMap::range_items`]).
//!
//! ## Components
//!
//! - `dynamodb`: items, key schemas, table configuration and the [`TableClient`] seam with
//!   its SDK ([`DynamoDb`]) and in-memory ([`MemoryClient`]) implementations.
//! - [`TableLifecycleManager`]: describe, create and wait for a table.
//! - [`ConditionalStore`]: single-item reads and (conditional) writes.
//! - [`ParallelScanner`]: serial or segmented full-table scans.
//! - [`Codec`]: conversion between application values and items, used by [`TypedMap`].
//!
//! ## Logging
//!
//! Everything is logged through `tracing`. The crate never installs a subscriber; each map
//! records its operations under its own span (see [`DynamoMap::with_span`]).

mod codec;
mod dynamodb;
mod error;
mod lifecycle;
mod map;
mod scan;
mod store;

pub mod logging;

#[cfg(test)]
mod tests;

pub use codec::{Codec, FnCodec, SerdeCodec};
pub use dynamodb::{
    Attributes, Condition, CreateTableRequest, DynamoDb, Item, KeyAttribute, KeySchema, KeyType,
    LifecycleOptions, MemoryClient, Operation, RuntimeOptions, ScanPage, ScanRequest, StoreError,
    TableClient, TableConfig, TableDescription, TableStatus, DEFAULT_TIME_TO_LIVE_ATTRIBUTE,
};
pub use error::{MapError, Result};
pub use lifecycle::TableLifecycleManager;
pub use map::{DynamoMap, TypedMap};
pub use scan::{ParallelScanner, ScanCursor};
pub use store::{ConditionalStore, LoadOrStored};
