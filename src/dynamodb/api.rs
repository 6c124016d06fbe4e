use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::dynamodb::{Item, KeySchema};

/// Attribute map used for continuation tokens.
pub type Attributes = HashMap<String, AttributeValue>;

/// The request/response operations this crate needs from a DynamoDB endpoint.
///
/// [`DynamoDb`](super::DynamoDb) implements it over the AWS SDK, and
/// [`MemoryClient`](super::MemoryClient) in process. Implementations must be safe to share
/// between tasks: a single handle serves every map operation and every scan worker.
/// Retries and timeouts are the implementation's concern.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Point read. `Ok(None)` when no item has the key.
    async fn get_item(&self, table: &str, key: Item, consistent: bool) -> Result<Option<Item>, StoreError>;

    /// Put, optionally guarded by a server-side condition on the existing item.
    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<(), StoreError>;

    /// Unconditional delete. Deleting a missing item succeeds.
    async fn delete_item(&self, table: &str, key: Item) -> Result<(), StoreError>;

    /// `Ok(None)` when the table does not exist.
    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, StoreError>;

    async fn create_table(&self, request: &CreateTableRequest) -> Result<(), StoreError>;

    async fn update_time_to_live(&self, table: &str, attribute: &str, enabled: bool) -> Result<(), StoreError>;

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError>;
}

/// Classification of remote failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The condition attached to a put did not hold.
    #[error("conditional check failed")]
    ConditionFailed,
    /// The table does not exist.
    #[error("resource not found")]
    NotFound,
    #[error(transparent)]
    Service(#[from] anyhow::Error),
}

/// A predicate over the existing item, evaluated by the store before a put.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The attribute is absent, i.e. no item with the same key exists.
    AttributeNotExists(String),
    /// The attribute exists and equals the value.
    AttributeEquals(String, AttributeValue),
}

impl Condition {
    /// Renders the condition as an expression with `#k`/`:v` placeholders.
    pub fn to_expression(&self) -> (String, HashMap<String, String>, Option<Attributes>) {
        match self {
            Condition::AttributeNotExists(name) => (
                "attribute_not_exists(#k)".to_string(),
                HashMap::from([("#k".to_string(), name.clone())]),
                None,
            ),
            Condition::AttributeEquals(name, value) => (
                "#k = :v".to_string(),
                HashMap::from([("#k".to_string(), name.clone())]),
                Some(HashMap::from([(":v".to_string(), value.clone())])),
            ),
        }
    }
}

/// Lifecycle state of a remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Absent,
    Creating,
    Active,
    Deleting,
    /// Any status this crate does not use, kept verbatim.
    Unknown(String),
}

impl TableStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, TableStatus::Active)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Absent => f.write_str("ABSENT"),
            TableStatus::Creating => f.write_str("CREATING"),
            TableStatus::Active => f.write_str("ACTIVE"),
            TableStatus::Deleting => f.write_str("DELETING"),
            TableStatus::Unknown(status) => f.write_str(status),
        }
    }
}

/// What a describe reports about an existing table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub status: TableStatus,
    /// Absent when the description carried no hash key element.
    pub key_schema: Option<KeySchema>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableRequest {
    pub table: String,
    pub key_schema: KeySchema,
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub server_side_encryption: bool,
}

/// One page request of a (possibly segmented) scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub consistent: bool,
    /// `(segment, total_segments)` for parallel scans.
    pub segment: Option<(i32, i32)>,
    pub exclusive_start_key: Option<Attributes>,
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub items: Vec<Item>,
    /// Continuation token; `None` once the segment is exhausted.
    pub last_evaluated_key: Option<Attributes>,
}
