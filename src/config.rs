//! Configuration manager for the user directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::user::PartitionStrategy;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_TABLE_NAME: &str = "UsersTable";
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Backing table.
    #[serde(default)]
    pub table: Table,
    /// How user rows are spread over partitions.
    #[serde(default)]
    pub partition: Partition,
    /// Rows fetched per segment when scanning users.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Related to Argon2 configuration.
    pub argon2: Option<Argon2>,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            table: Table::default(),
            partition: Partition::default(),
            page_size: DEFAULT_PAGE_SIZE,
            argon2: None,
            path: PathBuf::default(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Backing table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    #[serde(default = "default_table_name")]
    pub name: String,
    #[serde(default)]
    pub backend: Backend,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            name: DEFAULT_TABLE_NAME.to_owned(),
            backend: Backend::default(),
        }
    }
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_owned()
}

/// Storage engine behind the table.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Redb {
        /// Database file, created if missing.
        path: PathBuf,
    },
}

/// Partitioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Partition {
    /// Partition key, or prefix of shard partitions.
    pub key: String,
    /// Number of shards. Absent means every user shares one partition.
    pub shards: Option<u16>,
}

impl Default for Partition {
    fn default() -> Self {
        Self {
            key: crate::user::DEFAULT_PARTITION_KEY.to_owned(),
            shards: None,
        }
    }
}

impl Partition {
    /// Turn this section into a [`PartitionStrategy`].
    pub fn strategy(&self) -> PartitionStrategy {
        match self.shards {
            Some(shards) if shards > 1 => PartitionStrategy::Sharded {
                prefix: self.key.clone(),
                shards,
            },
            _ => PartitionStrategy::Fixed(self.key.clone()),
        }
    }
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(&file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file) {
                Ok(mut config) => {
                    config.path = file_path;
                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid");
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Configuration::default();

        assert_eq!(config.table.name, "UsersTable");
        assert_eq!(config.table.backend, Backend::Memory);
        assert_eq!(config.partition.strategy(), PartitionStrategy::default());
        assert_eq!(config.page_size, 1000);
    }

    #[test]
    fn test_read_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
table:
  name: Accounts
  backend:
    type: redb
    path: /tmp/accounts.redb
partition:
  key: Users
  shards: 4
page_size: 50
argon2:
  memory_cost: 4096
  iterations: 1
  parallelism: 1
  hash_length: 32
"#
        )
        .unwrap();

        let config = Configuration::default()
            .path(file.path().to_path_buf())
            .read();

        assert_eq!(config.table.name, "Accounts");
        assert_eq!(
            config.table.backend,
            Backend::Redb {
                path: "/tmp/accounts.redb".into()
            }
        );
        assert_eq!(
            config.partition.strategy(),
            PartitionStrategy::Sharded {
                prefix: "Users".into(),
                shards: 4
            }
        );
        assert_eq!(config.page_size, 50);
        assert_eq!(config.argon2.as_ref().map(|a| a.iterations), Some(1));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path("/nonexistent/config.yaml".into())
            .read();

        assert_eq!(config.table, Table::default());
    }
}
