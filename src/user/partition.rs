//! Mapping of user ids to table partitions.

/// Partition every user belongs to by default.
pub const DEFAULT_PARTITION_KEY: &str = "Users";

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Decides the partition of a user row from its id alone, so a point lookup
/// by id never needs a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// All users share one partition.
    Fixed(String),
    /// Users spread over `shards` partitions named `{prefix}-{nn}`.
    Sharded { prefix: String, shards: u16 },
}

impl Default for PartitionStrategy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_PARTITION_KEY.to_owned())
    }
}

impl PartitionStrategy {
    /// Partition key of the user with `id`.
    pub fn partition_for(&self, id: &str) -> String {
        match self {
            Self::Fixed(key) => key.clone(),
            Self::Sharded { prefix, shards } => {
                let shard = fnv1a(id.as_bytes()) % u64::from((*shards).max(1));
                shard_name(prefix, shard)
            },
        }
    }

    /// Every partition this strategy can produce.
    pub fn partitions(&self) -> Vec<String> {
        match self {
            Self::Fixed(key) => vec![key.clone()],
            Self::Sharded { prefix, shards } => (0..u64::from((*shards).max(1)))
                .map(|shard| shard_name(prefix, shard))
                .collect(),
        }
    }
}

fn shard_name(prefix: &str, shard: u64) -> String {
    format!("{prefix}-{shard:02}")
}

fn fnv1a(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
