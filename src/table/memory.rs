//! In-process table, mostly for tests and development.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    ContinuationToken, Filter, PartitionedTable, Properties, Segment,
    TableEntity, TableError, TableResult, from_properties, merge,
    to_properties,
};

type Key = (String, String);

/// Table held in memory.
///
/// Clones share the same rows.
#[derive(Debug)]
pub struct MemoryTable<T> {
    rows: Arc<DashMap<Key, Properties>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> MemoryTable<T> {
    /// Create a new, empty [`MemoryTable`].
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            _entity: PhantomData,
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> Default for MemoryTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryTable<T> {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T: TableEntity> PartitionedTable<T> for MemoryTable<T> {
    async fn get(&self, partition: &str, row: &str) -> TableResult<Option<T>> {
        let key = (partition.to_owned(), row.to_owned());
        let properties = self.rows.get(&key).map(|entry| entry.value().clone());

        properties.map(from_properties).transpose()
    }

    async fn query_segment(
        &self,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> TableResult<Segment<T>> {
        let mut keys: Vec<Key> = self
            .rows
            .iter()
            .filter(|entry| {
                let (partition, row) = entry.key();
                continuation.is_none_or(|token| token.precedes(partition, row))
                    && filter.matches(partition, entry.value())
            })
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();

        let limit = limit.max(1);
        let continuation = if keys.len() > limit {
            keys.truncate(limit);
            keys.last()
                .map(|(partition, row)| ContinuationToken::after(partition, row))
        } else {
            None
        };

        // Rows deleted since the key scan are skipped.
        let items = keys
            .iter()
            .filter_map(|key| self.rows.get(key).map(|entry| entry.value().clone()))
            .map(from_properties)
            .collect::<TableResult<Vec<T>>>()?;

        Ok(Segment {
            items,
            continuation,
        })
    }

    async fn insert_or_merge(&self, entity: &T) -> TableResult<()> {
        let key = (
            entity.partition_key().to_owned(),
            entity.row_key().to_owned(),
        );
        let incoming = to_properties(entity)?;

        self.rows
            .entry(key)
            .and_modify(|stored| merge(stored, incoming.clone()))
            .or_insert(incoming);
        Ok(())
    }

    async fn delete(&self, partition: &str, row: &str) -> TableResult<()> {
        let key = (partition.to_owned(), row.to_owned());

        match self.rows.remove(&key) {
            Some(_) => Ok(()),
            None => Err(TableError::NotFound {
                partition: key.0,
                row: key.1,
            }),
        }
    }
}
