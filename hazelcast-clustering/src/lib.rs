//! Cluster connectivity core of an async [Hazelcast](https://hazelcast.com/) client.
//!
//! This crate owns everything between a request and the member that serves
//! it: connections speaking the
//! [Hazelcast Open Binary Protocol](https://github.com/hazelcast/hazelcast-client-protocol),
//! authentication, heartbeats, the member and partition tables, routing with
//! retries, and event subscriptions that follow the cluster as members come
//! and go. Message codecs for data structures live on top of it.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hazelcast_clustering::{ClientConfig, Cluster};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ClientConfig::builder()
//!     .cluster_name("dev")
//!     .add_address("127.0.0.1:5701".parse()?)
//!     .build()?;
//!
//! let cluster = Cluster::builder(config)
//!     .authentication_codec(MyAuthenticationCodec)
//!     .cluster_view_codec(MyClusterViewCodec)
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! cluster.connect(&cancel).await?;
//!
//! let response = cluster.send_to_key_owner(request, &key, &cancel).await?;
//! cluster.shutdown().await;
//! ```
//!
//! # Routing
//!
//! With smart routing (the default) the client connects to every member and
//! sends partition-bound requests straight to the owner of the partition.
//! With smart routing disabled every request goes over whichever connection
//! is available.
//!
//! # Events
//!
//! | Channel | Obtain via | Carries |
//! |---------|-----------|---------|
//! | [`LifecycleEvent`] | [`Cluster::subscribe_lifecycle`] | Starting, connected, disconnected, shutdown |
//! | [`ClusterEvent`] | [`Cluster::subscribe_events`] | Connections, members and partition table changes |
//! | [`ClusterSubscription`] | [`Cluster::install_subscription`] | Server-pushed events, installed on every connection |

#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod connection;
pub mod invocation;
pub mod listener;
pub mod security;

pub use cluster::{
    Cluster, ClusterBuilder, ClusterEvent, ClusterViewCodec, ClusterViewEvent, MemberInfo,
    MemberTable, PartitionTable, Partitioner,
};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, HeartbeatConfig, InvocationConfig,
    NetworkConfig, RetryConfig, SecurityConfig,
};
pub use connection::{
    ClusterDiscovery, Connection, ConnectionId, LoadBalancer, RandomLoadBalancer, RetryStrategy,
    RoundRobinLoadBalancer, StaticAddressDiscovery,
};
pub use hazelcast_wire::{ClientMessage, HazelcastError, RemoteError, Result};
pub use invocation::{Invocation, InvocationTarget};
pub use listener::{ClusterSubscription, EventHandler, LifecycleEvent};
pub use security::{
    AuthenticationCodec, AuthenticationResult, Authenticator, Credentials, CredentialsFactory,
};
