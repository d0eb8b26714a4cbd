//! Table persisted in an embedded redb file.
//!
//! Every row lives in a single redb table under the key
//! `"{partition}\0{row}"`, so the rows of a partition are contiguous and
//! sorted by row key. Blocking redb calls run on tokio's blocking pool and
//! are not aborted when the calling future is dropped: a started write
//! still commits.

use std::marker::PhantomData;
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use ::redb::{Database, ReadableTable, TableDefinition};
use async_trait::async_trait;

use super::{
    ContinuationToken, Filter, PartitionedTable, Properties, Segment,
    TableEntity, TableError, TableResult, from_properties, merge,
    to_properties,
};

const KEY_SEPARATOR: char = '\0';

/// Table stored in a redb database file.
pub struct RedbTable<T> {
    db: Arc<Database>,
    name: Arc<str>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for RedbTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTable").field("name", &self.name).finish()
    }
}

impl<T> Clone for RedbTable<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            name: Arc::clone(&self.name),
            _entity: PhantomData,
        }
    }
}

fn encode_key(partition: &str, row: &str) -> String {
    format!("{partition}{KEY_SEPARATOR}{row}")
}

fn decode_key(key: &str) -> Option<(&str, &str)> {
    key.split_once(KEY_SEPARATOR)
}

fn definition(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

impl<T> RedbTable<T> {
    /// Open or create the database at `path` and make sure table `name`
    /// exists.
    pub fn open(path: &Path, name: &str) -> TableResult<Self> {
        let db = Database::create(path).map_err(TableError::storage)?;

        let write_txn = db.begin_write().map_err(TableError::storage)?;
        {
            let _table = write_txn
                .open_table(definition(name))
                .map_err(TableError::storage)?;
        }
        write_txn.commit().map_err(TableError::storage)?;

        tracing::info!(path = %path.display(), table = name, "redb table opened");

        Ok(Self {
            db: Arc::new(db),
            name: Arc::from(name),
            _entity: PhantomData,
        })
    }

    /// Run a blocking closure against the database on the blocking pool.
    async fn blocking<R, F>(&self, f: F) -> TableResult<R>
    where
        F: FnOnce(&Database, &str) -> TableResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let name = Arc::clone(&self.name);

        tokio::task::spawn_blocking(move || f(&db, &name)).await?
    }
}

fn read_row(
    db: &Database,
    name: &str,
    key: &str,
) -> TableResult<Option<Properties>> {
    let read_txn = db.begin_read().map_err(TableError::storage)?;
    let table = read_txn
        .open_table(definition(name))
        .map_err(TableError::storage)?;

    match table.get(key).map_err(TableError::storage)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(bytes.value())?)),
        None => Ok(None),
    }
}

#[async_trait]
impl<T: TableEntity> PartitionedTable<T> for RedbTable<T> {
    async fn get(&self, partition: &str, row: &str) -> TableResult<Option<T>> {
        let key = encode_key(partition, row);
        let properties = self
            .blocking(move |db, name| read_row(db, name, &key))
            .await?;

        properties.map(from_properties).transpose()
    }

    async fn query_segment(
        &self,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
        limit: usize,
    ) -> TableResult<Segment<T>> {
        let filter = filter.clone();
        let start = continuation.map(|token| encode_key(&token.partition, &token.row));
        let limit = limit.max(1);

        let (rows, continuation) = self
            .blocking(move |db, name| {
                let read_txn = db.begin_read().map_err(TableError::storage)?;
                let table = read_txn
                    .open_table(definition(name))
                    .map_err(TableError::storage)?;

                let lower = match start.as_deref() {
                    Some(key) => Bound::Excluded(key),
                    None => Bound::Unbounded,
                };
                let range = table
                    .range::<&str>((lower, Bound::Unbounded))
                    .map_err(TableError::storage)?;

                let mut rows = Vec::new();
                let mut continuation = None;
                for entry in range {
                    let (key, value) = entry.map_err(TableError::storage)?;
                    let Some((partition, row)) = decode_key(key.value()) else {
                        continue;
                    };

                    let properties: Properties =
                        serde_json::from_slice(value.value())?;
                    if !filter.matches(partition, &properties) {
                        continue;
                    }

                    if rows.len() == limit {
                        continuation = rows.last().map(
                            |(partition, row, _): &(String, String, Properties)| {
                                ContinuationToken::after(partition, row)
                            },
                        );
                        break;
                    }
                    rows.push((partition.to_owned(), row.to_owned(), properties));
                }

                Ok((rows, continuation))
            })
            .await?;

        let items = rows
            .into_iter()
            .map(|(_, _, properties)| from_properties(properties))
            .collect::<TableResult<Vec<T>>>()?;

        Ok(Segment {
            items,
            continuation,
        })
    }

    async fn insert_or_merge(&self, entity: &T) -> TableResult<()> {
        let key = encode_key(entity.partition_key(), entity.row_key());
        let incoming = to_properties(entity)?;

        self.blocking(move |db, name| {
            let write_txn = db.begin_write().map_err(TableError::storage)?;
            {
                let mut table = write_txn
                    .open_table(definition(name))
                    .map_err(TableError::storage)?;

                let stored = table
                    .get(key.as_str())
                    .map_err(TableError::storage)?
                    .map(|bytes| serde_json::from_slice::<Properties>(bytes.value()))
                    .transpose()?;
                let properties = match stored {
                    Some(mut stored) => {
                        merge(&mut stored, incoming);
                        stored
                    },
                    None => incoming,
                };

                let bytes = serde_json::to_vec(&properties)?;
                table
                    .insert(key.as_str(), bytes.as_slice())
                    .map_err(TableError::storage)?;
            }
            write_txn.commit().map_err(TableError::storage)
        })
        .await
    }

    async fn delete(&self, partition: &str, row: &str) -> TableResult<()> {
        let key = encode_key(partition, row);
        let (partition, row) = (partition.to_owned(), row.to_owned());

        self.blocking(move |db, name| {
            let write_txn = db.begin_write().map_err(TableError::storage)?;
            let removed = {
                let mut table = write_txn
                    .open_table(definition(name))
                    .map_err(TableError::storage)?;
                table
                    .remove(key.as_str())
                    .map_err(TableError::storage)?
                    .is_some()
            };

            if !removed {
                write_txn.abort().map_err(TableError::storage)?;
                return Err(TableError::NotFound { partition, row });
            }
            write_txn.commit().map_err(TableError::storage)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Row {
        partition_key: String,
        row_key: String,
        #[serde(default)]
        size: Option<u32>,
    }

    impl TableEntity for Row {
        fn partition_key(&self) -> &str {
            &self.partition_key
        }

        fn row_key(&self) -> &str {
            &self.row_key
        }
    }

    fn row(partition: &str, id: &str, size: Option<u32>) -> Row {
        Row {
            partition_key: partition.into(),
            row_key: id.into(),
            size,
        }
    }

    #[test]
    fn test_key_encoding() {
        let key = encode_key("Users", "abc");
        assert_eq!(decode_key(&key), Some(("Users", "abc")));
        assert!(encode_key("Users", "zzz") < encode_key("Users2", "aaa"));
    }

    #[tokio::test]
    async fn test_persisted_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.redb");

        {
            let table = RedbTable::<Row>::open(&path, "UsersTable").unwrap();
            table.insert_or_merge(&row("P", "1", Some(3))).await.unwrap();
            table.insert_or_merge(&row("P", "2", None)).await.unwrap();
            table.insert_or_merge(&row("P", "1", Some(4))).await.unwrap();
        }

        let table = RedbTable::<Row>::open(&path, "UsersTable").unwrap();
        assert_eq!(
            table.get("P", "1").await.unwrap(),
            Some(row("P", "1", Some(4)))
        );
        assert_eq!(table.get("P", "3").await.unwrap(), None);

        table.delete("P", "2").await.unwrap();
        let err = table.delete("P", "2").await.unwrap_err();
        assert!(matches!(err, TableError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_paginated_scan() {
        let dir = tempfile::tempdir().unwrap();
        let table =
            RedbTable::<Row>::open(&dir.path().join("t.redb"), "UsersTable")
                .unwrap();

        for i in 0..5 {
            table
                .insert_or_merge(&row("P", &i.to_string(), Some(i)))
                .await
                .unwrap();
        }
        table.insert_or_merge(&row("Q", "0", Some(0))).await.unwrap();

        let filter = Filter::partition("P");
        let first = table.query_segment(&filter, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.continuation.is_some());

        let all = table.query(&filter).await.unwrap();
        assert_eq!(all.len(), 5);

        let zero = table
            .query(&Filter::all().and_eq("Size", 0))
            .await
            .unwrap();
        assert_eq!(zero.len(), 2);
    }
}
