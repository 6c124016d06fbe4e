use std::time::Duration;

use crate::dynamodb::{KeySchema, KeyType};
use crate::error::{MapError, Result};

/// Attribute name used for expiry stamps when a TTL duration is set without a name.
pub const DEFAULT_TIME_TO_LIVE_ATTRIBUTE: &str = "TTL";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_LOAD_OR_STORE_ATTEMPTS: u32 = 10;
const ENV_PREFIX: &str = "DYNAMODB_MAP_";

/// DynamoDB table configuration.
///
/// This struct names a specific DynamoDB table and says how the map should use it.
/// It is composed of three parts that are supplied once and never change afterwards:
///
/// - **Key schema**: the hash key and optional range key. It may be left unset when the
///   table already exists; the key names are then discovered from the table description.
/// - **Lifecycle options**: whether to create a missing table and how.
/// - **Runtime options**: versioning, expiry, consistency and scan fan-out.
///
/// # Table Capacity
///
/// Tables created by this crate use provisioned capacity. Capacity hints below one unit
/// are raised to one.
///
/// # Example
///
/// ```
/// use dynamodb_map::{KeySchema, KeyType, LifecycleOptions, RuntimeOptions, TableConfig};
/// use std::time::Duration;
///
/// let config = TableConfig::new("user_messages")
///     .with_key_schema(KeySchema::new("user_id", KeyType::String))
///     .with_lifecycle(LifecycleOptions::default().create_if_absent(true))
///     .with_runtime(
///         RuntimeOptions::default()
///             .scan_concurrency(4)
///             .time_to_live(Duration::from_secs(3600)),
///     );
/// assert_eq!(config.name(), "user_messages");
/// ```
#[derive(Debug, Clone)]
pub struct TableConfig {
    name: String,
    key_schema: Option<KeySchema>,
    lifecycle: LifecycleOptions,
    runtime: RuntimeOptions,
}

/// Options used while making the table ready.
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    pub create_if_absent: bool,
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub server_side_encryption: bool,
    /// How long to wait between describes while the table is `Creating`.
    pub poll_interval: Duration,
}

/// Options that shape every item operation and scan.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Numeric attribute compared by `store_if_version`. Never incremented by this crate.
    pub version_attribute: Option<String>,
    pub time_to_live_attribute: Option<String>,
    /// Items are stamped to expire this long after each write. Zero disables stamping.
    pub time_to_live: Duration,
    /// Number of parallel scan segments. One or less scans serially.
    pub scan_concurrency: usize,
    pub consistent_reads: bool,
    /// Page size limit for scans; the store's own limit applies when unset.
    pub scan_page_size: Option<i32>,
    pub max_load_or_store_attempts: u32,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            create_if_absent: false,
            read_capacity: 1,
            write_capacity: 1,
            server_side_encryption: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl LifecycleOptions {
    pub fn create_if_absent(mut self, create: bool) -> Self {
        self.create_if_absent = create;
        self
    }

    pub fn capacity(mut self, read: i64, write: i64) -> Self {
        self.read_capacity = read;
        self.write_capacity = write;
        self
    }

    pub fn server_side_encryption(mut self, enabled: bool) -> Self {
        self.server_side_encryption = enabled;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            version_attribute: None,
            time_to_live_attribute: None,
            time_to_live: Duration::ZERO,
            scan_concurrency: 1,
            consistent_reads: false,
            scan_page_size: None,
            max_load_or_store_attempts: DEFAULT_MAX_LOAD_OR_STORE_ATTEMPTS,
        }
    }
}

impl RuntimeOptions {
    pub fn version_attribute(mut self, name: impl Into<String>) -> Self {
        self.version_attribute = Some(name.into());
        self
    }

    pub fn time_to_live(mut self, duration: Duration) -> Self {
        self.time_to_live = duration;
        self
    }

    pub fn time_to_live_attribute(mut self, name: impl Into<String>) -> Self {
        self.time_to_live_attribute = Some(name.into());
        self
    }

    pub fn scan_concurrency(mut self, workers: usize) -> Self {
        self.scan_concurrency = workers;
        self
    }

    pub fn consistent_reads(mut self, consistent: bool) -> Self {
        self.consistent_reads = consistent;
        self
    }

    pub fn scan_page_size(mut self, size: i32) -> Self {
        self.scan_page_size = Some(size);
        self
    }

    pub fn max_load_or_store_attempts(mut self, attempts: u32) -> Self {
        self.max_load_or_store_attempts = attempts;
        self
    }

    /// The attribute stamped with an expiry time, if stamping is enabled.
    pub fn ttl_attribute(&self) -> Option<&str> {
        if self.time_to_live.is_zero() {
            return None;
        }
        Some(
            self.time_to_live_attribute
                .as_deref()
                .unwrap_or(DEFAULT_TIME_TO_LIVE_ATTRIBUTE),
        )
    }
}

impl TableConfig {
    /// Creates a new `TableConfig` with default options and no key schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_schema: None,
            lifecycle: LifecycleOptions::default(),
            runtime: RuntimeOptions::default(),
        }
    }

    /// Sets the key schema and returns the modified `TableConfig`.
    pub fn with_key_schema(mut self, schema: KeySchema) -> Self {
        self.key_schema = Some(schema);
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleOptions) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeOptions) -> Self {
        self.runtime = runtime;
        self
    }

    /// Returns the name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the key schema, if configured.
    pub fn key_schema(&self) -> Option<&KeySchema> {
        self.key_schema.as_ref()
    }

    pub fn lifecycle(&self) -> &LifecycleOptions {
        &self.lifecycle
    }

    pub fn runtime(&self) -> &RuntimeOptions {
        &self.runtime
    }

    /// Reads the configuration from `DYNAMODB_MAP_*` environment variables.
    ///
    /// Only `DYNAMODB_MAP_TABLE` is required. See [`TableConfig::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup function.
    ///
    /// Recognized variables (all prefixed with `DYNAMODB_MAP_`): `TABLE`, `HASH_KEY`,
    /// `HASH_KEY_TYPE`, `RANGE_KEY`, `RANGE_KEY_TYPE`, `VERSION_ATTRIBUTE`, `TTL_ATTRIBUTE`,
    /// `TTL_SECONDS`, `SCAN_CONCURRENCY`, `CONSISTENT_READS`, `SCAN_PAGE_SIZE`,
    /// `MAX_LOAD_OR_STORE_ATTEMPTS`, `CREATE_TABLE`, `READ_CAPACITY`, `WRITE_CAPACITY`,
    /// `SSE` and `POLL_INTERVAL_MS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let name = var("TABLE").ok_or_else(|| {
            MapError::InvalidConfig(format!("{ENV_PREFIX}TABLE must be set"))
        })?;

        let mut config = TableConfig::new(name);

        if let Some(hash_key) = var("HASH_KEY") {
            let hash_type = parse_or(var("HASH_KEY_TYPE"), "HASH_KEY_TYPE", KeyType::String)?;
            let mut schema = KeySchema::new(hash_key, hash_type);
            if let Some(range_key) = var("RANGE_KEY") {
                let range_type =
                    parse_or(var("RANGE_KEY_TYPE"), "RANGE_KEY_TYPE", KeyType::String)?;
                schema = schema.with_range(range_key, range_type);
            }
            config.key_schema = Some(schema);
        } else if var("RANGE_KEY").is_some() {
            return Err(MapError::InvalidConfig(format!(
                "{ENV_PREFIX}RANGE_KEY requires {ENV_PREFIX}HASH_KEY"
            )));
        }

        let lifecycle = &mut config.lifecycle;
        lifecycle.create_if_absent = parse_bool(var("CREATE_TABLE"), "CREATE_TABLE")?;
        lifecycle.read_capacity = parse_or(var("READ_CAPACITY"), "READ_CAPACITY", 1)?;
        lifecycle.write_capacity = parse_or(var("WRITE_CAPACITY"), "WRITE_CAPACITY", 1)?;
        lifecycle.server_side_encryption = parse_bool(var("SSE"), "SSE")?;
        if let Some(ms) = var("POLL_INTERVAL_MS") {
            lifecycle.poll_interval = Duration::from_millis(parse(&ms, "POLL_INTERVAL_MS")?);
        }

        let runtime = &mut config.runtime;
        runtime.version_attribute = var("VERSION_ATTRIBUTE");
        runtime.time_to_live_attribute = var("TTL_ATTRIBUTE");
        runtime.time_to_live = Duration::from_secs(parse_or(var("TTL_SECONDS"), "TTL_SECONDS", 0)?);
        runtime.scan_concurrency = parse_or(var("SCAN_CONCURRENCY"), "SCAN_CONCURRENCY", 1)?;
        runtime.consistent_reads = parse_bool(var("CONSISTENT_READS"), "CONSISTENT_READS")?;
        runtime.scan_page_size = var("SCAN_PAGE_SIZE")
            .map(|v| parse(&v, "SCAN_PAGE_SIZE"))
            .transpose()?;
        runtime.max_load_or_store_attempts = parse_or(
            var("MAX_LOAD_OR_STORE_ATTEMPTS"),
            "MAX_LOAD_OR_STORE_ATTEMPTS",
            DEFAULT_MAX_LOAD_OR_STORE_ATTEMPTS,
        )?;

        Ok(config)
    }

    /// Backfills a key schema discovered from the remote table description.
    pub(crate) fn set_key_schema(&mut self, schema: KeySchema) {
        self.key_schema = Some(schema);
    }
}

fn parse<T: std::str::FromStr>(value: &str, suffix: &str) -> Result<T> {
    value.parse().map_err(|_| {
        MapError::InvalidConfig(format!("{ENV_PREFIX}{suffix} has invalid value `{value}`"))
    })
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, suffix: &str, default: T) -> Result<T> {
    value.map_or(Ok(default), |v| parse(&v, suffix))
}

fn parse_bool(value: Option<String>, suffix: &str) -> Result<bool> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(MapError::InvalidConfig(format!(
            "{ENV_PREFIX}{suffix} has invalid value `{other}`"
        ))),
    }
}
