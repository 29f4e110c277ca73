//! Cluster membership, partition ownership and request routing.

#[allow(clippy::module_inception)]
pub(crate) mod cluster;
mod connect;
mod events;
mod members;
mod partitioner;
mod routing;
mod subscriptions;
mod view;

pub use cluster::{Cluster, ClusterBuilder};
pub use events::ClusterEvent;
pub use members::{MemberDiff, MemberInfo, MemberTable, MemberVersion};
pub use partitioner::{PartitionTable, Partitioner};
pub use view::{ClusterViewCodec, ClusterViewEvent};
