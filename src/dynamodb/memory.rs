//! In-process [`TableClient`] for tests and local experiments.
//!
//! Conditions are evaluated under a single lock, so concurrent conditional puts race the
//! same way they do against DynamoDB: exactly one wins.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use bigdecimal::BigDecimal;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::dynamodb::{
    Attributes, Condition, CreateTableRequest, Item, KeySchema, ScanPage, ScanRequest,
    StoreError, TableClient, TableDescription, TableStatus,
};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Remote operations, used to inject faults and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetItem,
    PutItem,
    DeleteItem,
    DescribeTable,
    CreateTable,
    UpdateTimeToLive,
    Scan,
}

/// In-memory stand-in for a DynamoDB endpoint.
///
/// # Example
///
/// ```
/// use dynamodb_map::{KeySchema, KeyType, MemoryClient};
///
/// let client = MemoryClient::new()
///     .with_table("people", KeySchema::new("id", KeyType::Number))
///     .with_page_size(10);
/// assert_eq!(client.item_count("people"), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryClient {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    page_size: Option<usize>,
    creation_polls: u32,
    one_shot_failures: HashMap<Operation, Vec<String>>,
    failing_segments: HashMap<i32, String>,
    rejected_conditions: u32,
    calls: HashMap<Operation, usize>,
    last_consistent: HashMap<Operation, bool>,
    last_scan_limit: Option<i32>,
}

#[derive(Debug)]
struct MemoryTable {
    schema: KeySchema,
    status: TableStatus,
    pending_polls: u32,
    // Ordered by rendered key so pagination is stable.
    items: BTreeMap<String, Item>,
    created_with: Option<CreateTableRequest>,
    time_to_live: Option<String>,
}

impl MemoryTable {
    fn new(schema: KeySchema, status: TableStatus) -> Self {
        Self {
            schema,
            status,
            pending_polls: 0,
            items: BTreeMap::new(),
            created_with: None,
            time_to_live: None,
        }
    }

    fn key_of(&self, item: &Item) -> Result<String, StoreError> {
        let mut rendered = String::new();
        for name in self.schema.key_names() {
            let value = item.get(name).ok_or_else(|| {
                StoreError::Service(anyhow::anyhow!(
                    "ValidationException: missing key attribute `{name}`"
                ))
            })?;
            rendered.push_str(&render(value));
            rendered.push('\u{1f}');
        }
        Ok(rendered)
    }

    fn segment_of(&self, item: &Item, total_segments: i32) -> i32 {
        let mut hasher = DefaultHasher::new();
        item.get(self.schema.hash_key()).map(render).hash(&mut hasher);
        (hasher.finish() % total_segments.max(1) as u64) as i32
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active table.
    pub fn with_table(self, name: impl Into<String>, schema: KeySchema) -> Self {
        self.lock()
            .tables
            .insert(name.into(), MemoryTable::new(schema, TableStatus::Active));
        self
    }

    /// Limits scan pages to `size` items unless the request asks for fewer.
    pub fn with_page_size(self, size: usize) -> Self {
        self.lock().page_size = Some(size.max(1));
        self
    }

    /// Newly created tables report `Creating` for this many describes.
    pub fn with_creation_polls(self, polls: u32) -> Self {
        self.lock().creation_polls = polls;
        self
    }

    pub fn set_status(&self, table: &str, status: TableStatus) {
        if let Some(t) = self.lock().tables.get_mut(table) {
            t.status = status;
        }
    }

    /// The next call of `operation` fails with a service error carrying `message`.
    pub fn fail_next(&self, operation: Operation, message: impl Into<String>) {
        self.lock()
            .one_shot_failures
            .entry(operation)
            .or_default()
            .push(message.into());
    }

    /// Every scan of `segment` fails with a service error carrying `message`.
    pub fn fail_scans_of_segment(&self, segment: i32, message: impl Into<String>) {
        self.lock().failing_segments.insert(segment, message.into());
    }

    /// The next `times` conditional puts fail their condition regardless of stored state.
    pub fn reject_conditions(&self, times: u32) {
        self.lock().rejected_conditions = times;
    }

    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Consistency flag of the latest `GetItem` or `Scan` request.
    pub fn last_consistent(&self, operation: Operation) -> Option<bool> {
        self.lock().last_consistent.get(&operation).copied()
    }

    /// Page limit sent with the latest scan request.
    pub fn last_scan_limit(&self) -> Option<i32> {
        self.lock().last_scan_limit
    }

    pub fn item_count(&self, table: &str) -> usize {
        self.lock().tables.get(table).map_or(0, |t| t.items.len())
    }

    pub fn created_with(&self, table: &str) -> Option<CreateTableRequest> {
        self.lock().tables.get(table).and_then(|t| t.created_with.clone())
    }

    /// Attribute with expiry enabled, if any.
    pub fn time_to_live_attribute(&self, table: &str) -> Option<String> {
        self.lock().tables.get(table).and_then(|t| t.time_to_live.clone())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and pops an injected failure, if any.
    fn begin(&self, operation: Operation) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some(message) = state
            .one_shot_failures
            .get_mut(&operation)
            .and_then(|queue| (!queue.is_empty()).then(|| queue.remove(0)))
        {
            return Err(StoreError::Service(anyhow::anyhow!(message)));
        }
        Ok(state)
    }
}

impl State {
    fn table(&mut self, name: &str) -> Result<&mut MemoryTable, StoreError> {
        self.tables.get_mut(name).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl TableClient for MemoryClient {
    async fn get_item(&self, table: &str, key: Item, consistent: bool) -> Result<Option<Item>, StoreError> {
        let mut state = self.begin(Operation::GetItem)?;
        state.last_consistent.insert(Operation::GetItem, consistent);
        let table = state.table(table)?;
        let key = table.key_of(&key)?;
        Ok(table.items.get(&key).cloned())
    }

    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<(), StoreError> {
        let mut state = self.begin(Operation::PutItem)?;
        if condition.is_some() && state.rejected_conditions > 0 {
            state.rejected_conditions -= 1;
            return Err(StoreError::ConditionFailed);
        }
        let table = state.table(table)?;
        let key = table.key_of(&item)?;
        let existing = table.items.get(&key);
        let holds = match &condition {
            None => true,
            Some(Condition::AttributeNotExists(name)) => !existing.is_some_and(|i| i.exists(name)),
            Some(Condition::AttributeEquals(name, expected)) => existing
                .and_then(|i| i.get(name))
                .is_some_and(|actual| values_equal(actual, expected)),
        };
        if !holds {
            return Err(StoreError::ConditionFailed);
        }
        table.items.insert(key, item);
        Ok(())
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<(), StoreError> {
        let mut state = self.begin(Operation::DeleteItem)?;
        let table = state.table(table)?;
        let key = table.key_of(&key)?;
        table.items.remove(&key);
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, StoreError> {
        let mut state = self.begin(Operation::DescribeTable)?;
        let Some(table) = state.tables.get_mut(table) else {
            return Ok(None);
        };
        if table.status == TableStatus::Creating {
            if table.pending_polls == 0 {
                table.status = TableStatus::Active;
            } else {
                table.pending_polls -= 1;
            }
        }
        Ok(Some(TableDescription {
            status: table.status.clone(),
            key_schema: Some(table.schema.clone()),
        }))
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<(), StoreError> {
        let mut state = self.begin(Operation::CreateTable)?;
        if state.tables.contains_key(&request.table) {
            return Err(StoreError::Service(anyhow::anyhow!(
                "ResourceInUseException: table `{}` already exists",
                request.table
            )));
        }
        let mut table = MemoryTable::new(request.key_schema.clone(), TableStatus::Creating);
        table.pending_polls = state.creation_polls;
        table.created_with = Some(request.clone());
        state.tables.insert(request.table.clone(), table);
        Ok(())
    }

    async fn update_time_to_live(&self, table: &str, attribute: &str, enabled: bool) -> Result<(), StoreError> {
        let mut state = self.begin(Operation::UpdateTimeToLive)?;
        let table = state.table(table)?;
        table.time_to_live = enabled.then(|| attribute.to_string());
        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError> {
        let page = {
            let mut state = self.begin(Operation::Scan)?;
            state.last_consistent.insert(Operation::Scan, request.consistent);
            state.last_scan_limit = request.limit;
            if let Some((segment, _)) = request.segment {
                if let Some(message) = state.failing_segments.get(&segment) {
                    return Err(StoreError::Service(anyhow::anyhow!(message.clone())));
                }
            }
            let limit = request
                .limit
                .map(|l| l.max(1) as usize)
                .into_iter()
                .chain(state.page_size)
                .min()
                .unwrap_or(DEFAULT_PAGE_SIZE);
            let table = state.table(&request.table)?;

            let start = match &request.exclusive_start_key {
                Some(token) => Some(table.key_of(&Item::from(token.clone()))?),
                None => None,
            };
            let in_segment = |item: &Item| match request.segment {
                Some((segment, total)) => table.segment_of(item, total) == segment,
                None => true,
            };

            let mut items = Vec::new();
            let mut last_key = None;
            let mut more = false;
            for (key, item) in table.items.iter() {
                if start.as_ref().is_some_and(|s| key <= s) || !in_segment(item) {
                    continue;
                }
                if items.len() == limit {
                    more = true;
                    break;
                }
                last_key = Some(item);
                items.push(item.clone());
            }
            let last_evaluated_key: Option<Attributes> = if more {
                last_key.map(|item| item.project(table.schema.key_names()).into_attributes())
            } else {
                None
            };
            ScanPage {
                items,
                last_evaluated_key,
            }
        };
        // Let other scan workers interleave between pages.
        tokio::task::yield_now().await;
        Ok(page)
    }
}

fn render(value: &AttributeValue) -> String {
    match value {
        AttributeValue::N(n) => format!("N:{}", normalize_number(n)),
        other => format!("{other:?}"),
    }
}

// Exact, so that numbers beyond f64 precision stay distinct.
fn normalize_number(n: &str) -> String {
    BigDecimal::from_str(n.trim())
        .map(|d| d.normalized().to_string())
        .unwrap_or_else(|_| n.to_string())
}

fn values_equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::N(x), AttributeValue::N(y)) => normalize_number(x) == normalize_number(y),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamodb::KeyType;

    fn request(segment: Option<(i32, i32)>, token: Option<Attributes>) -> ScanRequest {
        ScanRequest {
            table: "t".into(),
            consistent: false,
            segment,
            exclusive_start_key: token,
            limit: None,
        }
    }

    #[tokio::test]
    async fn test_scan_pages_until_exhausted() {
        let client = MemoryClient::new()
            .with_table("t", KeySchema::new("id", KeyType::Number))
            .with_page_size(2);
        for i in 0..5 {
            client.put_item("t", Item::new().set_int("id", i), None).await.unwrap();
        }

        let mut seen = 0;
        let mut token = None;
        loop {
            let page = client.scan(&request(None, token)).await.unwrap();
            assert!(page.items.len() <= 2);
            seen += page.items.len();
            token = page.last_evaluated_key;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(seen, 5);
    }

    #[tokio::test]
    async fn test_segments_partition_the_table() {
        let client = MemoryClient::new().with_table("t", KeySchema::new("id", KeyType::String));
        for i in 0..50 {
            client
                .put_item("t", Item::new().set_string("id", format!("k{i}")), None)
                .await
                .unwrap();
        }

        let mut total = 0;
        for segment in 0..3 {
            let page = client.scan(&request(Some((segment, 3)), None)).await.unwrap();
            assert!(page.last_evaluated_key.is_none());
            total += page.items.len();
        }
        assert_eq!(total, 50);
    }

    #[tokio::test]
    async fn test_numeric_condition_ignores_formatting() {
        let client = MemoryClient::new().with_table("t", KeySchema::new("id", KeyType::String));
        let item = Item::new().set_string("id", "a").set("v", AttributeValue::N("3.0".into()));
        client.put_item("t", item.clone(), None).await.unwrap();

        let condition = Condition::AttributeEquals("v".into(), AttributeValue::N("3".into()));
        assert!(client.put_item("t", item, Some(condition)).await.is_ok());
    }

    #[tokio::test]
    async fn test_large_numbers_are_compared_exactly() {
        let client = MemoryClient::new().with_table("t", KeySchema::new("id", KeyType::Number));
        let absent = || Some(Condition::AttributeNotExists("id".into()));
        let low = Item::new().set("id", AttributeValue::N("9007199254740992".into()));
        let high = Item::new()
            .set("id", AttributeValue::N("9007199254740993".into()))
            .set("v", AttributeValue::N("9007199254740993".into()));

        client.put_item("t", low, absent()).await.unwrap();
        client.put_item("t", high.clone(), absent()).await.unwrap();
        assert_eq!(client.item_count("t"), 2);

        let stale = Condition::AttributeEquals("v".into(), AttributeValue::N("9007199254740992".into()));
        assert!(matches!(
            client.put_item("t", high, Some(stale)).await,
            Err(StoreError::ConditionFailed)
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let client = MemoryClient::new().with_table("t", KeySchema::new("id", KeyType::String));
        client.fail_next(Operation::GetItem, "ThrottlingException");
        let key = Item::new().set_string("id", "a");

        assert!(matches!(
            client.get_item("t", key.clone(), false).await,
            Err(StoreError::Service(_))
        ));
        assert!(client.get_item("t", key, false).await.unwrap().is_none());
        assert_eq!(client.calls(Operation::GetItem), 2);
    }
}
