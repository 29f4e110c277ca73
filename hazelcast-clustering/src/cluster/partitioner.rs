//! Partition ownership and key-to-partition mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use hazelcast_wire::protocol::compute_partition_hash;
use hazelcast_wire::{HazelcastError, Result};
use uuid::Uuid;

use crate::connection::ConnectionId;

/// Immutable partition ownership snapshot.
#[derive(Debug, Clone, Default)]
pub struct PartitionTable {
    source: Option<ConnectionId>,
    version: i32,
    owners: HashMap<i32, Uuid>,
}

impl PartitionTable {
    /// Returns the version of the partition view this table came from,
    /// or -1 before any view was received.
    pub fn version(&self) -> i32 {
        if self.source.is_none() {
            -1
        } else {
            self.version
        }
    }

    /// Returns the owner of a partition.
    pub fn owner(&self, partition_id: i32) -> Option<Uuid> {
        self.owners.get(&partition_id).copied()
    }

    /// Returns the number of partitions with a known owner.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no partition has a known owner.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Maps keys to partitions and partitions to their owning members.
///
/// The partition count is fixed by the first authenticated connection. The
/// ownership table is replaced wholesale on every accepted partition view.
#[derive(Debug, Default)]
pub struct Partitioner {
    count: AtomicUsize,
    table: ArcSwap<PartitionTable>,
}

impl Partitioner {
    /// Creates a partitioner with an unknown partition count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the partition count, or 0 while it is unknown.
    pub fn partition_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Sets the partition count reported by a member, or verifies it
    /// against the one already known.
    pub fn set_partition_count(&self, count: usize) -> Result<()> {
        match self
            .count
            .compare_exchange(0, count, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::debug!(partition_count = count, "partition count set");
                Ok(())
            }
            Err(current) if current == count => Ok(()),
            Err(current) => Err(HazelcastError::Connection(format!(
                "member reports {} partitions but the cluster has {}",
                count, current
            ))),
        }
    }

    /// Returns the partition a serialized key belongs to.
    pub fn partition_id(&self, key: &[u8]) -> Result<i32> {
        let count = self.partition_count();
        if count == 0 {
            return Err(HazelcastError::NoConnection(
                "partition count is not known yet".to_string(),
            ));
        }
        Ok(Self::partition_id_for_hash(compute_partition_hash(key), count))
    }

    /// Maps a partition hash onto `count` partitions.
    pub fn partition_id_for_hash(hash: i32, count: usize) -> i32 {
        if count == 0 {
            return 0;
        }
        if hash == i32::MIN {
            0
        } else {
            (hash.unsigned_abs() as usize % count) as i32
        }
    }

    /// Returns the member owning a partition.
    pub fn partition_owner(&self, partition_id: i32) -> Option<Uuid> {
        self.table.load().owner(partition_id)
    }

    /// Returns the member owning the partition of a serialized key.
    pub fn key_owner(&self, key: &[u8]) -> Option<Uuid> {
        let partition_id = self.partition_id(key).ok()?;
        self.partition_owner(partition_id)
    }

    /// Returns the current ownership snapshot.
    pub fn table(&self) -> Arc<PartitionTable> {
        self.table.load_full()
    }

    /// Applies a partition view received on `source`.
    ///
    /// A view from the connection that sent the current table is applied
    /// only if its version is newer. A view from another connection always
    /// wins, since versions are not comparable across members after a
    /// cluster-events failover. Returns true if the table was replaced.
    pub fn update(
        &self,
        source: ConnectionId,
        version: i32,
        partitions: Vec<(Uuid, Vec<i32>)>,
    ) -> bool {
        let owners: HashMap<i32, Uuid> = partitions
            .into_iter()
            .flat_map(|(member, ids)| ids.into_iter().map(move |id| (id, member)))
            .collect();
        let table = Arc::new(PartitionTable {
            source: Some(source),
            version,
            owners,
        });

        let is_stale = |current: &Arc<PartitionTable>| {
            current.source == Some(source) && version <= current.version
        };
        let previous = self.table.rcu(|current| {
            if is_stale(current) {
                Arc::clone(current)
            } else {
                Arc::clone(&table)
            }
        });
        if is_stale(&previous) {
            tracing::trace!(
                version = version,
                current = previous.version,
                "ignoring stale partition view"
            );
            return false;
        }

        tracing::debug!(
            version = version,
            partitions = table.owners.len(),
            "applied partition view"
        );
        true
    }

    /// Forgets every partition owner, keeping the partition count.
    pub fn reset(&self) {
        self.table.store(Arc::new(PartitionTable::default()));
    }
}
