use std::collections::HashMap;

use dashmap::DashMap;
use thiserror::Error;

/// Storage failures callers branch on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The named partition is not hosted on this node. For routed requests
    /// this is the signal that the caller must forward to the owner.
    #[error("partition {0} does not exist")]
    NoSuchShard(u64),
    #[error("key does not exist")]
    NoSuchKey,
}

/// In-memory partitioned store: partition id to key-value map.
///
/// Reads are concurrent; writes to distinct partitions proceed in parallel.
/// Partition lifecycle (create/drop) is driven by view changes only.
pub struct PartitionedStore {
    partitions: DashMap<u64, DashMap<String, String>>,
}

impl PartitionedStore {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    pub fn get(&self, shard: u64, key: &str) -> Option<String> {
        self.partitions
            .get(&shard)
            .and_then(|partition| partition.get(key).map(|value| value.clone()))
    }

    /// Stores a key in the named partition. Returns whether an existing value
    /// was replaced.
    pub fn set(&self, shard: u64, key: String, value: String) -> Result<bool, StoreError> {
        match self.partitions.get(&shard) {
            Some(partition) => Ok(partition.insert(key, value).is_some()),
            None => Err(StoreError::NoSuchShard(shard)),
        }
    }

    pub fn delete(&self, shard: u64, key: &str) -> Result<(), StoreError> {
        let partition = self
            .partitions
            .get(&shard)
            .ok_or(StoreError::NoSuchShard(shard))?;

        match partition.remove(key) {
            Some(_) => Ok(()),
            None => Err(StoreError::NoSuchKey),
        }
    }

    /// Total number of keys across all hosted partitions.
    pub fn key_count(&self) -> usize {
        self.partitions
            .iter()
            .map(|entry| entry.value().len())
            .sum()
    }

    /// Merges pushed keys into their named partitions. Every named partition
    /// must already be hosted locally; an unknown id fails the whole batch.
    pub fn bulk_ingest(
        &self,
        batches: HashMap<u64, HashMap<String, String>>,
    ) -> Result<(), StoreError> {
        for shard in batches.keys() {
            if !self.partitions.contains_key(shard) {
                return Err(StoreError::NoSuchShard(*shard));
            }
        }

        for (shard, pairs) in batches {
            if let Some(partition) = self.partitions.get(&shard) {
                for (key, value) in pairs {
                    partition.insert(key, value);
                }
            }
        }

        Ok(())
    }

    pub fn create_partition(&self, shard: u64) {
        self.partitions.entry(shard).or_insert_with(DashMap::new);
    }

    pub fn drop_partition(&self, shard: u64) {
        self.partitions.remove(&shard);
    }

    pub fn hosts(&self, shard: u64) -> bool {
        self.partitions.contains_key(&shard)
    }

    pub fn partition_ids(&self) -> Vec<u64> {
        self.partitions.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of all pairs currently held in a partition.
    pub fn partition_entries(&self, shard: u64) -> Vec<(String, String)> {
        let mut entries = Vec::new();
        if let Some(partition) = self.partitions.get(&shard) {
            for entry in partition.iter() {
                entries.push((entry.key().clone(), entry.value().clone()));
            }
        }
        entries
    }
}
