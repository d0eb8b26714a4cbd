//! Runtime selection between table backends.

use async_trait::async_trait;

use super::{
    ContinuationToken, Filter, MemoryTable, PartitionedTable, RedbTable,
    Segment, TableEntity, TableResult,
};
use crate::config;

/// Any table backend, chosen from configuration.
#[derive(Debug, Clone)]
pub enum TableBackend<T> {
    /// In-memory rows, lost on exit.
    Memory(MemoryTable<T>),
    /// Rows persisted in a redb file.
    Redb(RedbTable<T>),
}

impl<T> TableBackend<T> {
    /// Build the backend described by the `table` configuration section.
    pub fn from_config(config: &config::Table) -> TableResult<Self> {
        match &config.backend {
            config::Backend::Memory => {
                tracing::debug!(table = %config.name, "using in-memory table");
                Ok(Self::Memory(MemoryTable::new()))
            },
            config::Backend::Redb { path } => {
                Ok(Self::Redb(RedbTable::open(path, &config.name)?))
            },
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory(_))
    }
}

#[async_trait]
impl<T: TableEntity> PartitionedTable<T> for TableBackend<T> {
    async fn get(&self, partition: &str, row: &str) -> TableResult<Option<T>> {
        match self {
            Self::Memory(table) => table.get(partition, row).await,
            Self::Redb(table) => table.get(partition, row).await,
        }
    }

    async fn query_segment(
        &self,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> TableResult<Segment<T>> {
        match self {
            Self::Memory(table) => {
                table.query_segment(filter, continuation, limit).await
            },
            Self::Redb(table) => {
                table.query_segment(filter, continuation, limit).await
            },
        }
    }

    async fn insert_or_merge(&self, entity: &T) -> TableResult<()> {
        match self {
            Self::Memory(table) => table.insert_or_merge(entity).await,
            Self::Redb(table) => table.insert_or_merge(entity).await,
        }
    }

    async fn delete(&self, partition: &str, row: &str) -> TableResult<()> {
        match self {
            Self::Memory(table) => table.delete(partition, row).await,
            Self::Redb(table) => table.delete(partition, row).await,
        }
    }
}
