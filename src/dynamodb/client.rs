use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{
        AttributeDefinition, KeySchemaElement, KeyType as SdkKeyType, ProvisionedThroughput,
        Select, SseSpecification, TableStatus as SdkTableStatus, TimeToLiveSpecification,
    },
    Client,
};
use std::fmt;
use tracing::{debug, error, info};

use crate::dynamodb::{
    Condition, CreateTableRequest, Item, KeySchema, KeyType, ScanPage, ScanRequest, StoreError,
    TableClient, TableDescription, TableStatus,
};

/// DynamoDB client wrapper implementing [`TableClient`] over the AWS SDK.
///
/// This struct translates the small set of requests the map needs into SDK calls and
/// classifies the failures that come back.
///
/// # Error Classification
///
/// - `ConditionalCheckFailedException` becomes [`StoreError::ConditionFailed`], which the
///   conditional map operations turn into a `false` result.
/// - `ResourceNotFoundException` becomes [`StoreError::NotFound`].
/// - Everything else (throttling, validation, transport) is passed on as
///   [`StoreError::Service`].
///
/// Retry and timeout behavior is whatever the SDK config carries; nothing is retried here.
///
/// # Example
///
/// ```rust,no_run
/// use dynamodb_map::{DynamoDb, DynamoMap, KeySchema, KeyType, TableConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = aws_config::load_from_env().await;
///     let client = Arc::new(DynamoDb::new(&config));
///     client.check_auth().await?;
///
///     let table = TableConfig::new("users").with_key_schema(KeySchema::new("user_id", KeyType::String));
///     let users = DynamoMap::connect(client, table).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DynamoDb {
    client: Client,
}

impl DynamoDb {
    /// Creates a new `DynamoDb` instance.
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    /// Wraps an already configured SDK client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Verifies authentication by attempting to list tables.
    pub async fn check_auth(&self) -> Result<()> {
        self.client.list_tables().send().await.map_err(|e| {
            error!("Authentication failed: {}", DisplayErrorContext(&e));
            anyhow!("Authentication failed")
        })?;
        info!("Authentication successful");
        Ok(())
    }
}

#[async_trait]
impl TableClient for DynamoDb {
    async fn get_item(&self, table: &str, key: Item, consistent: bool) -> Result<Option<Item>, StoreError> {
        debug!(table, key = %key, consistent, "get item request");
        let response = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(key.attributes))
            .consistent_read(consistent)
            .send()
            .await
            .map_err(classify)?;

        Ok(response
            .item
            .filter(|attrs| !attrs.is_empty())
            .map(Item::from))
    }

    async fn put_item(&self, table: &str, item: Item, condition: Option<Condition>) -> Result<(), StoreError> {
        debug!(table, item = %item, ?condition, "put item request");
        let mut put = self
            .client
            .put_item()
            .table_name(table)
            .set_item(Some(item.attributes));

        if let Some(condition) = condition {
            let (expression, names, values) = condition.to_expression();
            put = put
                .condition_expression(expression)
                .set_expression_attribute_names(Some(names))
                .set_expression_attribute_values(values);
        }

        put.send().await.map_err(classify)?;
        Ok(())
    }

    async fn delete_item(&self, table: &str, key: Item) -> Result<(), StoreError> {
        debug!(table, key = %key, "delete item request");
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(key.attributes))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<Option<TableDescription>, StoreError> {
        debug!(table, "describe table request");
        let response = match self.client.describe_table().table_name(table).send().await {
            Ok(response) => response,
            Err(e) => {
                return match classify(e) {
                    StoreError::NotFound => Ok(None),
                    other => Err(other),
                }
            }
        };

        let Some(description) = response.table else {
            return Ok(None);
        };

        let status = match description.table_status() {
            Some(SdkTableStatus::Active) | Some(SdkTableStatus::Updating) => TableStatus::Active,
            Some(SdkTableStatus::Creating) => TableStatus::Creating,
            Some(SdkTableStatus::Deleting) => TableStatus::Deleting,
            Some(other) => TableStatus::Unknown(other.as_str().to_string()),
            None => TableStatus::Unknown("UNKNOWN".to_string()),
        };

        let key_type_of = |name: &str| {
            description
                .attribute_definitions()
                .iter()
                .find(|def| def.attribute_name() == name)
                .map(|def| KeyType::from_scalar_attribute_type(def.attribute_type()))
                .unwrap_or_default()
        };

        let mut hash = None;
        let mut range = None;
        for element in description.key_schema() {
            let name = element.attribute_name();
            match element.key_type() {
                SdkKeyType::Hash => hash = Some((name.to_string(), key_type_of(name))),
                _ => range = Some((name.to_string(), key_type_of(name))),
            }
        }
        let key_schema = hash.map(|(name, key_type)| {
            let schema = KeySchema::new(name, key_type);
            match range {
                Some((name, key_type)) => schema.with_range(name, key_type),
                None => schema,
            }
        });

        debug!(table, %status, ?key_schema, "describe table response");
        Ok(Some(TableDescription { status, key_schema }))
    }

    async fn create_table(&self, request: &CreateTableRequest) -> Result<(), StoreError> {
        let (attribute_definitions, key_schema) =
            key_definitions(&request.key_schema).map_err(StoreError::Service)?;
        let throughput = ProvisionedThroughput::builder()
            .read_capacity_units(request.read_capacity)
            .write_capacity_units(request.write_capacity)
            .build()
            .map_err(|e| StoreError::Service(e.into()))?;

        let mut create = self
            .client
            .create_table()
            .table_name(&request.table)
            .set_attribute_definitions(Some(attribute_definitions))
            .set_key_schema(Some(key_schema))
            .provisioned_throughput(throughput);

        if request.server_side_encryption {
            create = create.sse_specification(SseSpecification::builder().enabled(true).build());
        }

        debug!(table = %request.table, ?request, "create table request");
        create.send().await.map_err(classify)?;
        info!("Table '{}' creation requested", request.table);
        Ok(())
    }

    async fn update_time_to_live(&self, table: &str, attribute: &str, enabled: bool) -> Result<(), StoreError> {
        let specification = TimeToLiveSpecification::builder()
            .attribute_name(attribute)
            .enabled(enabled)
            .build()
            .map_err(|e| StoreError::Service(e.into()))?;

        self.client
            .update_time_to_live()
            .table_name(table)
            .time_to_live_specification(specification)
            .send()
            .await
            .map_err(classify)?;

        info!("Time to live on '{table}' set to {enabled} for attribute '{attribute}'");
        Ok(())
    }

    async fn scan(&self, request: &ScanRequest) -> Result<ScanPage, StoreError> {
        let mut scan = self
            .client
            .scan()
            .table_name(&request.table)
            .consistent_read(request.consistent)
            .select(Select::AllAttributes)
            .set_exclusive_start_key(request.exclusive_start_key.clone())
            .set_limit(request.limit);

        if let Some((segment, total_segments)) = request.segment {
            scan = scan.segment(segment).total_segments(total_segments);
        }

        let response = scan.send().await.map_err(classify)?;

        Ok(ScanPage {
            items: response
                .items
                .unwrap_or_default()
                .into_iter()
                .map(Item::from)
                .collect(),
            last_evaluated_key: response.last_evaluated_key.filter(|key| !key.is_empty()),
        })
    }
}

/// Builds attribute definitions and key schema elements for table creation.
fn key_definitions(schema: &KeySchema) -> Result<(Vec<AttributeDefinition>, Vec<KeySchemaElement>)> {
    let mut attribute_definitions = vec![AttributeDefinition::builder()
        .attribute_name(schema.hash_key())
        .attribute_type(schema.hash().key_type.scalar_attribute_type())
        .build()?];

    let mut key_schema = vec![KeySchemaElement::builder()
        .attribute_name(schema.hash_key())
        .key_type(SdkKeyType::Hash)
        .build()?];

    if let Some(range) = schema.range() {
        attribute_definitions.push(
            AttributeDefinition::builder()
                .attribute_name(&range.name)
                .attribute_type(range.key_type.scalar_attribute_type())
                .build()?,
        );
        key_schema.push(
            KeySchemaElement::builder()
                .attribute_name(&range.name)
                .key_type(SdkKeyType::Range)
                .build()?,
        );
    }

    Ok((attribute_definitions, key_schema))
}

/// Sorts an SDK failure by its service error code.
fn classify<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    match err.code() {
        Some("ConditionalCheckFailedException") => StoreError::ConditionFailed,
        Some("ResourceNotFoundException") => StoreError::NotFound,
        _ => {
            debug!("remote error: {}", DisplayErrorContext(&err));
            StoreError::Service(anyhow::Error::new(err))
        }
    }
}
