//! Member and partition views pushed by the cluster-events connection.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use hazelcast_wire::protocol::ClientMessage;
use hazelcast_wire::Result;
use uuid::Uuid;

use crate::cluster::cluster::ClusterState;
use crate::cluster::{ClusterEvent, MemberDiff, MemberInfo, MemberTable};
use crate::connection::ConnectionId;

/// A topology update decoded from a cluster view event.
#[derive(Debug, Clone)]
pub enum ClusterViewEvent {
    /// The complete member list at a topology version.
    Members {
        /// Topology version.
        version: i32,
        /// Every member of the cluster.
        members: Vec<MemberInfo>,
    },
    /// The complete partition ownership at a partition table version.
    Partitions {
        /// Partition table version.
        version: i32,
        /// Owner member and its partition ids.
        partitions: Vec<(Uuid, Vec<i32>)>,
    },
}

/// Encodes the cluster view subscription and decodes its events.
pub trait ClusterViewCodec: Send + Sync {
    /// Encodes the request that subscribes a connection to cluster views.
    fn encode_add_listener_request(&self) -> ClientMessage;

    /// Decodes a member view or partition view event.
    fn decode_event(&self, event: &ClientMessage) -> Result<ClusterViewEvent>;
}

impl std::fmt::Debug for dyn ClusterViewCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClusterViewCodec")
    }
}

impl ClusterState {
    pub(crate) fn handle_cluster_view_event(
        self: &Arc<Self>,
        source: ConnectionId,
        event: ClusterViewEvent,
    ) {
        match event {
            ClusterViewEvent::Members { version, members } => {
                self.handle_members_view(version, members)
            }
            ClusterViewEvent::Partitions {
                version,
                partitions,
            } => self.handle_partitions_view(source, version, partitions),
        }
    }

    /// Replaces the member table with a newer view and reconciles
    /// connections with it.
    pub(crate) fn handle_members_view(self: &Arc<Self>, version: i32, members: Vec<MemberInfo>) {
        let table = Arc::new(MemberTable::new(version, members));
        let previous = self.members.rcu(|current| {
            if version > current.version() {
                Arc::clone(&table)
            } else {
                Arc::clone(current)
            }
        });
        if previous.version() >= version {
            tracing::trace!(
                version = version,
                current = previous.version(),
                "ignoring stale member view"
            );
            return;
        }

        let diff = MemberDiff::between(&previous, &table);
        self.load_balancer.set_members(table.member_ids());
        tracing::info!(
            version = version,
            members = table.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "member view applied"
        );

        if !self.first_members.swap(true, Ordering::AcqRel) {
            self.members_gate.send_replace(true);
        }

        for member in &diff.removed {
            if let Some(connection) = self.connection_to_member(&member.id()) {
                tokio::spawn(async move {
                    connection.shutdown("member left the cluster").await;
                });
            }
            let _ = self.events.send(ClusterEvent::MemberRemoved(member.clone()));
        }

        for member in &diff.added {
            let _ = self.events.send(ClusterEvent::MemberAdded(member.clone()));
        }

        if self.config.network().smart_routing() && !self.shutdown.is_cancelled() {
            self.connect_to_unconnected_members(&table);
        }
    }

    fn connect_to_unconnected_members(self: &Arc<Self>, table: &MemberTable) {
        for member in table.members() {
            if self.connections.contains_key(&member.id()) {
                continue;
            }
            let state = Arc::clone(self);
            let address = member.address();
            let cancel = self.shutdown.child_token();
            tokio::spawn(async move {
                if let Err(e) = state.connect_to_address(address, &cancel).await {
                    tracing::debug!(address = %address, error = %e, "could not connect to member");
                }
            });
        }
    }

    pub(crate) fn handle_partitions_view(
        &self,
        source: ConnectionId,
        version: i32,
        partitions: Vec<(Uuid, Vec<i32>)>,
    ) {
        if self.partitioner.update(source, version, partitions) {
            let _ = self.events.send(ClusterEvent::PartitionsUpdated { version });
        }
    }
}
