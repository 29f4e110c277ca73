//! Load balancing strategies for distributing requests across cluster members.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rand::Rng;
use uuid::Uuid;

/// A strategy for selecting the member that receives a request which is
/// not bound to a partition.
///
/// The cluster pushes the current member ids with [`set_members`](Self::set_members)
/// every time the membership changes.
pub trait LoadBalancer: Send + Sync {
    /// Replaces the members to choose from.
    fn set_members(&self, members: Vec<Uuid>);

    /// Selects a member, or `None` if no member is known.
    fn select(&self) -> Option<Uuid>;
}

impl std::fmt::Debug for dyn LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoadBalancer")
    }
}

/// A load balancer that cycles through members in round-robin fashion.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    members: RwLock<Vec<Uuid>>,
    index: AtomicUsize,
}

impl RoundRobinLoadBalancer {
    /// Creates a new round-robin load balancer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn set_members(&self, members: Vec<Uuid>) {
        *self.members.write() = members;
    }

    fn select(&self) -> Option<Uuid> {
        let members = self.members.read();
        if members.is_empty() {
            return None;
        }
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % members.len();
        Some(members[idx])
    }
}

/// A load balancer that randomly selects members.
#[derive(Debug, Default)]
pub struct RandomLoadBalancer {
    members: RwLock<Vec<Uuid>>,
}

impl RandomLoadBalancer {
    /// Creates a new random load balancer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RandomLoadBalancer {
    fn set_members(&self, members: Vec<Uuid>) {
        *self.members.write() = members;
    }

    fn select(&self) -> Option<Uuid> {
        let members = self.members.read();
        if members.is_empty() {
            return None;
        }
        let idx = rand::thread_rng().gen_range(0..members.len());
        Some(members[idx])
    }
}

/// Creates a default load balancer (round-robin).
pub fn default_load_balancer() -> Arc<dyn LoadBalancer> {
    Arc::new(RoundRobinLoadBalancer::new())
}
