//! Connections to cluster members and the policies around them.

pub(crate) mod connection;
mod discovery;
mod heartbeat;
mod load_balancer;
mod retry;

pub use connection::{Connection, ConnectionId, ConnectionObserver};
pub(crate) use discovery::merge_candidates;
pub use discovery::{ClusterDiscovery, StaticAddressDiscovery};
pub use heartbeat::Heartbeat;
pub use load_balancer::{
    default_load_balancer, LoadBalancer, RandomLoadBalancer, RoundRobinLoadBalancer,
};
pub use retry::RetryStrategy;
