use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::dynamodb::{CreateTableRequest, TableClient, TableConfig, TableStatus};
use crate::error::{MapError, Result};

/// Makes a table usable before any item operation touches it.
///
/// `Creating` is polled at the configured interval for as long as it lasts; there is no cap
/// and no backoff. `Deleting` is terminal and never waited out.
#[derive(Clone)]
pub struct TableLifecycleManager {
    client: Arc<dyn TableClient>,
}

impl TableLifecycleManager {
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        Self { client }
    }

    /// Describes the table, waiting while it is `Creating`.
    ///
    /// With `discover_keys`, a usable table's key schema is copied into `config` when none is
    /// configured yet.
    #[instrument(skip_all, fields(table = %config.name(), discover_keys = discover_keys))]
    pub async fn describe_status(&self, config: &mut TableConfig, discover_keys: bool) -> Result<TableStatus> {
        loop {
            let Some(description) = self.client.describe_table(config.name()).await? else {
                debug!("table does not exist");
                return Ok(TableStatus::Absent);
            };

            if description.status == TableStatus::Creating {
                debug!(poll_interval = ?config.lifecycle().poll_interval, "table is still creating");
                tokio::time::sleep(config.lifecycle().poll_interval).await;
                continue;
            }

            if discover_keys && description.status.is_usable() && config.key_schema().is_none() {
                let schema = description.key_schema.ok_or_else(|| {
                    MapError::Fatal(format!(
                        "active table `{}` was described without a hash key",
                        config.name()
                    ))
                })?;
                info!(
                    "Discovered key schema of '{}': hash key '{}', range key {:?}",
                    config.name(),
                    schema.hash_key(),
                    schema.range_key()
                );
                config.set_key_schema(schema);
            }
            return Ok(description.status);
        }
    }

    /// Requests creation of the table with the configured key schema.
    ///
    /// Capacity hints below one unit are raised to one.
    #[instrument(skip_all, fields(table = %config.name()))]
    pub async fn create_table(&self, config: &TableConfig) -> Result<()> {
        let key_schema = config.key_schema().cloned().ok_or_else(|| {
            MapError::InvalidConfig(format!(
                "creating table `{}` requires a key schema",
                config.name()
            ))
        })?;
        let lifecycle = config.lifecycle();
        let request = CreateTableRequest {
            table: config.name().to_string(),
            key_schema,
            read_capacity: lifecycle.read_capacity.max(1),
            write_capacity: lifecycle.write_capacity.max(1),
            server_side_encryption: lifecycle.server_side_encryption,
        };
        self.client.create_table(&request).await?;
        info!("Table '{}' is being created", config.name());
        Ok(())
    }

    /// Brings the table to `Active`, creating it if allowed, and fills in a missing key schema.
    ///
    /// When the key schema is configured and creation is off, nothing is checked remotely;
    /// the first item operation reports a missing table.
    #[instrument(skip_all, fields(table = %config.name()))]
    pub async fn ensure_ready(&self, config: &mut TableConfig) -> Result<()> {
        if config.lifecycle().create_if_absent {
            if config.key_schema().is_none() {
                return Err(MapError::InvalidConfig(format!(
                    "table `{}` cannot be created without a key schema",
                    config.name()
                )));
            }
            let status = match self.describe_status(config, false).await? {
                TableStatus::Absent => {
                    self.create_table(config).await?;
                    let status = self.describe_status(config, false).await?;
                    if status.is_usable() {
                        self.enable_time_to_live(config).await?;
                    }
                    status
                }
                status => status,
            };
            return self.require_usable(config, status);
        }

        if config.key_schema().is_none() {
            let status = self.describe_status(config, true).await?;
            return self.require_usable(config, status);
        }

        Ok(())
    }

    async fn enable_time_to_live(&self, config: &TableConfig) -> Result<()> {
        let Some(attribute) = config.runtime().ttl_attribute() else {
            return Ok(());
        };
        self.client
            .update_time_to_live(config.name(), attribute, true)
            .await?;
        info!("Expiry enabled on '{}' for attribute '{attribute}'", config.name());
        Ok(())
    }

    fn require_usable(&self, config: &TableConfig, status: TableStatus) -> Result<()> {
        if !status.is_usable() {
            return Err(MapError::TableUnusable {
                table: config.name().to_string(),
                status,
            });
        }
        info!("Table '{}' is active", config.name());
        Ok(())
    }
}
