use thiserror::Error;

use crate::dynamodb::{StoreError, TableStatus};

/// Errors returned by the map and its components.
///
/// A failed conditional write is never reported here: conditional operations
/// turn it into a `false` result. Remote failures are passed through verbatim
/// in [`MapError::Remote`] and are not retried by this crate.
#[derive(Debug, Error)]
pub enum MapError {
    /// An item handed to the map does not carry the configured hash key.
    #[error("item is missing key attribute `{0}`")]
    MissingKeyAttribute(String),

    /// The table is absent, being deleted, or otherwise not usable.
    #[error("table `{table}` is not usable (status: {status})")]
    TableUnusable { table: String, status: TableStatus },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `load_or_store` lost the insert race on every attempt it was allowed.
    #[error("load_or_store gave up after {attempts} contended attempts")]
    Contention { attempts: u32 },

    #[error("codec error: {0}")]
    Codec(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Throttling, validation, transport or any other remote failure.
    #[error(transparent)]
    Remote(anyhow::Error),

    /// A condition that can only come from a bug, reported instead of panicking.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl From<StoreError> for MapError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Service(e) => MapError::Remote(e),
            other => MapError::Remote(anyhow::Error::new(other)),
        }
    }
}

pub type Result<T, E = MapError> = std::result::Result<T, E>;
