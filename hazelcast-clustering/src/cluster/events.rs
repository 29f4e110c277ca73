//! Notifications about connections, members and partitions.

use std::fmt;
use std::net::SocketAddr;

use uuid::Uuid;

use crate::cluster::MemberInfo;
use crate::connection::ConnectionId;

/// A change in the cluster as seen by this client.
#[derive(Debug, Clone)]
pub enum ClusterEvent {
    /// An authenticated connection was registered.
    ConnectionAdded {
        /// The connection.
        id: ConnectionId,
        /// Address of the member.
        address: SocketAddr,
        /// Id of the member.
        member_id: Uuid,
    },
    /// A registered connection was closed.
    ConnectionRemoved {
        /// The connection.
        id: ConnectionId,
        /// Address of the member.
        address: SocketAddr,
        /// Id of the member, if the connection had authenticated.
        member_id: Option<Uuid>,
    },
    /// A member joined the cluster.
    MemberAdded(MemberInfo),
    /// A member left the cluster.
    MemberRemoved(MemberInfo),
    /// A new partition table was applied.
    PartitionsUpdated {
        /// Version of the partition view.
        version: i32,
    },
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionAdded { id, address, .. } => {
                write!(f, "ConnectionAdded[{} {}]", id, address)
            }
            Self::ConnectionRemoved { id, address, .. } => {
                write!(f, "ConnectionRemoved[{} {}]", id, address)
            }
            Self::MemberAdded(member) => write!(f, "MemberAdded[{}]", member),
            Self::MemberRemoved(member) => write!(f, "MemberRemoved[{}]", member),
            Self::PartitionsUpdated { version } => write!(f, "PartitionsUpdated[{}]", version),
        }
    }
}
