//! Partitioned key-value table abstraction.
//!
//! Rows are addressed by a composite `(partition, row)` key and stored as
//! their serialized property map. Backends only need to support point reads,
//! filtered scans, insert-or-merge and delete.

pub mod backend;
pub mod memory;
pub mod redb;

pub use backend::TableBackend;
pub use memory::MemoryTable;
pub use self::redb::RedbTable;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub type TableResult<T> = std::result::Result<T, TableError>;

/// Serialized form of a row.
pub type Properties = Map<String, Value>;

/// Errors returned by a [`PartitionedTable`].
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("row ({partition}, {row}) does not exist")]
    NotFound { partition: String, row: String },
    #[error("entity (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("blocking storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TableError {
    /// Stable code describing the failure.
    pub fn code(&self) -> &'static str {
        match self {
            TableError::NotFound { .. } => "ResourceNotFound",
            TableError::Serialization(_) => "SerializationError",
            TableError::Storage(_) => "StorageError",
            TableError::Task(_) => "TaskFailed",
        }
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        TableError::Storage(err.to_string())
    }
}

/// Row type storable in a [`PartitionedTable`].
pub trait TableEntity:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    fn partition_key(&self) -> &str;
    fn row_key(&self) -> &str;
}

/// Opaque position where the next segment of a scan starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken {
    pub(crate) partition: String,
    pub(crate) row: String,
}

impl ContinuationToken {
    pub(crate) fn after(partition: &str, row: &str) -> Self {
        Self {
            partition: partition.to_owned(),
            row: row.to_owned(),
        }
    }

    /// Whether `(partition, row)` sorts strictly after this token.
    pub(crate) fn precedes(&self, partition: &str, row: &str) -> bool {
        (self.partition.as_str(), self.row.as_str()) < (partition, row)
    }
}

/// One page of a filtered scan.
#[derive(Debug, Clone)]
pub struct Segment<T> {
    pub items: Vec<T>,
    /// `None` once the scan is exhausted.
    pub continuation: Option<ContinuationToken>,
}

/// Row predicate: a partition restriction plus attribute equalities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    partitions: Vec<String>,
    equals: Vec<(String, Value)>,
}

impl Filter {
    /// Filter matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Filter matching rows of a single partition.
    pub fn partition(partition: impl Into<String>) -> Self {
        Self {
            partitions: vec![partition.into()],
            equals: Vec::new(),
        }
    }

    /// Filter matching rows of any of `partitions`.
    pub fn partitions<I, S>(partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            partitions: partitions.into_iter().map(Into::into).collect(),
            equals: Vec::new(),
        }
    }

    /// Add an equality predicate on a serialized attribute.
    pub fn and_eq(
        mut self,
        attribute: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.equals.push((attribute.into(), value.into()));
        self
    }

    pub fn matches(&self, partition: &str, properties: &Properties) -> bool {
        let in_partition = self.partitions.is_empty()
            || self.partitions.iter().any(|p| p == partition);

        in_partition
            && self
                .equals
                .iter()
                .all(|(attribute, value)| properties.get(attribute) == Some(value))
    }
}

/// Generic key-value table: point get, filtered scan, upsert and delete.
#[async_trait]
pub trait PartitionedTable<T: TableEntity>: Send + Sync {
    /// Point lookup by composite key.
    async fn get(&self, partition: &str, row: &str) -> TableResult<Option<T>>;

    /// Returns at most `limit` matching rows in key order, starting after
    /// `continuation`.
    async fn query_segment(
        &self,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> TableResult<Segment<T>>;

    /// Insert the row, or merge its properties into the existing one.
    async fn insert_or_merge(&self, entity: &T) -> TableResult<()>;

    /// Remove the row. Fails with [`TableError::NotFound`] if it is absent.
    async fn delete(&self, partition: &str, row: &str) -> TableResult<()>;

    /// Drain every segment matching `filter`.
    async fn query(&self, filter: &Filter) -> TableResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut continuation = None;

        loop {
            let segment = self
                .query_segment(filter, continuation.as_ref(), DEFAULT_SEGMENT_SIZE)
                .await?;
            rows.extend(segment.items);

            match segment.continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(rows),
            }
        }
    }
}

/// Maximum rows returned by a single segment when draining a scan.
pub const DEFAULT_SEGMENT_SIZE: usize = 1000;

/// Serialize an entity into its property map.
pub(crate) fn to_properties<T: TableEntity>(
    entity: &T,
) -> TableResult<Properties> {
    match serde_json::to_value(entity)? {
        Value::Object(map) => Ok(map),
        other => Err(TableError::Storage(format!(
            "entity must serialize to an object, got {other}"
        ))),
    }
}

pub(crate) fn from_properties<T: TableEntity>(
    properties: Properties,
) -> TableResult<T> {
    Ok(serde_json::from_value(Value::Object(properties))?)
}

/// Merge `incoming` into `stored`: incoming properties win, stored
/// properties missing from `incoming` are kept.
pub(crate) fn merge(stored: &mut Properties, incoming: Properties) {
    for (key, value) in incoming {
        stored.insert(key, value);
    }
}
