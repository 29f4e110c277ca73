//! Sources of candidate member addresses for connecting to the cluster.

use std::collections::HashSet;
use std::net::SocketAddr;

use async_trait::async_trait;
use hazelcast_wire::Result;

use crate::config::NetworkConfig;

/// Trait for discovering Hazelcast cluster member addresses.
#[async_trait]
pub trait ClusterDiscovery: Send + Sync + std::fmt::Debug {
    /// Discovers available cluster member addresses.
    async fn discover(&self) -> Result<Vec<SocketAddr>>;
}

/// Static address discovery using a pre-configured list of addresses.
#[derive(Debug, Clone)]
pub struct StaticAddressDiscovery {
    addresses: Vec<SocketAddr>,
}

impl StaticAddressDiscovery {
    /// Creates a new static discovery with the given addresses.
    ///
    /// Duplicate addresses are dropped, keeping the first occurrence.
    pub fn new(addresses: Vec<SocketAddr>) -> Self {
        Self {
            addresses: dedup_preserving_order(addresses),
        }
    }

    /// Creates a static discovery from the configured member addresses.
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.addresses().to_vec())
    }

    /// Returns the configured addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }
}

#[async_trait]
impl ClusterDiscovery for StaticAddressDiscovery {
    async fn discover(&self) -> Result<Vec<SocketAddr>> {
        Ok(self.addresses.clone())
    }
}

impl<T> From<T> for StaticAddressDiscovery
where
    T: IntoIterator<Item = SocketAddr>,
{
    fn from(addresses: T) -> Self {
        Self::new(addresses.into_iter().collect())
    }
}

/// Combines discovered addresses with the addresses of already known
/// members, discovered ones first.
pub(crate) fn merge_candidates(
    discovered: Vec<SocketAddr>,
    known: impl IntoIterator<Item = SocketAddr>,
) -> Vec<SocketAddr> {
    dedup_preserving_order(discovered.into_iter().chain(known))
}

fn dedup_preserving_order(addresses: impl IntoIterator<Item = SocketAddr>) -> Vec<SocketAddr> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|address| seen.insert(*address))
        .collect()
}
