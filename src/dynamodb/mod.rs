//! # DynamoDB Module
//!
//! The pieces of the map that speak DynamoDB's language: items, key schemas, table
//! configuration, and the request/response seam to the remote store.
//!
//! ## Components
//!
//! - `TableClient`: the operations the map needs from a DynamoDB endpoint.
//! - `DynamoDb`: `TableClient` over the AWS SDK.
//! - `MemoryClient`: `TableClient` in process, for tests.
//! - `Item`: one record, a map of attribute names to `AttributeValue`s.
//! - `KeySchema`: the hash and optional range key, and key projection.
//! - `TableConfig`: table name, key schema, lifecycle and runtime options.
//!
//! ## Usage
//!
//! `DynamoDb` is built from an `aws_config::SdkConfig`, usually loaded from the environment:
//!
//! - `AWS_ACCESS_KEY_ID`: Your AWS access key ID.
//! - `AWS_SECRET_ACCESS_KEY`: Your AWS secret access key.
//! - `AWS_REGION`: The AWS region where your DynamoDB tables are located.
//!
//! Optionally, you can also set:
//! - `AWS_SESSION_TOKEN`: If you're using temporary credentials.
//! - `AWS_ENDPOINT_URL`: For using a custom endpoint (e.g., for local development).
//!
//! Table settings can be read from `DYNAMODB_MAP_*` variables with
//! [`TableConfig::from_env`].

mod api;
mod client;
mod item;
mod memory;
mod schema;
mod table;

pub use api::{
    Attributes, Condition, CreateTableRequest, ScanPage, ScanRequest, StoreError, TableClient,
    TableDescription, TableStatus,
};
pub use client::DynamoDb;
pub use item::Item;
pub use memory::{MemoryClient, Operation};
pub use schema::{KeyAttribute, KeySchema, KeyType};
pub use table::{LifecycleOptions, RuntimeOptions, TableConfig, DEFAULT_TIME_TO_LIVE_ATTRIBUTE};
