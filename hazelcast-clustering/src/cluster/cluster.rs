//! The cluster context: connection registry, topology and subscriptions.

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use hazelcast_wire::protocol::ClientMessage;
use hazelcast_wire::{HazelcastError, Result};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cluster::view::ClusterViewCodec;
use crate::cluster::{ClusterEvent, MemberInfo, MemberTable, Partitioner};
use crate::config::ClientConfig;
use crate::connection::{
    default_load_balancer, ClusterDiscovery, Connection, ConnectionObserver, LoadBalancer,
    StaticAddressDiscovery,
};
use crate::invocation::{CorrelationIdSequence, Invocation};
use crate::listener::subscription::assume_removed;
use crate::listener::{ClusterSubscription, LifecycleEvent};
use crate::security::{
    AuthenticationCodec, Authenticator, CodecAuthenticator, CredentialsFactory,
    StaticCredentialsFactory,
};

const LIFECYCLE_CHANNEL_CAPACITY: usize = 16;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared state behind a [`Cluster`] handle.
pub(crate) struct ClusterState {
    pub(crate) config: ClientConfig,
    pub(crate) client_id: Uuid,
    pub(crate) discovery: Arc<dyn ClusterDiscovery>,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) credentials: Arc<dyn CredentialsFactory>,
    pub(crate) load_balancer: Arc<dyn LoadBalancer>,
    pub(crate) sequence: Arc<CorrelationIdSequence>,
    pub(crate) hooks: Arc<ClusterHooks>,
    /// Authenticated connections by member id.
    pub(crate) connections: DashMap<Uuid, Arc<Connection>>,
    pub(crate) address_locks: DashMap<SocketAddr, Arc<AsyncMutex<()>>>,
    pub(crate) connected: AtomicBool,
    pub(crate) members: ArcSwap<MemberTable>,
    pub(crate) first_members: AtomicBool,
    pub(crate) members_gate: watch::Sender<bool>,
    pub(crate) partitioner: Partitioner,
    pub(crate) cluster_events: Mutex<Option<Arc<Connection>>>,
    pub(crate) cluster_view: Arc<ClusterSubscription>,
    pub(crate) subscriptions: DashMap<Uuid, Arc<ClusterSubscription>>,
    /// Subscriptions by the correlation id their events carry.
    pub(crate) correlated: DashMap<i64, Arc<ClusterSubscription>>,
    pub(crate) lifecycle: broadcast::Sender<LifecycleEvent>,
    pub(crate) events: broadcast::Sender<ClusterEvent>,
    pub(crate) started: AtomicBool,
    pub(crate) shutdown: CancellationToken,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterState {
    pub(crate) fn connection_snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn connection_to_member(&self, member_id: &Uuid) -> Option<Arc<Connection>> {
        self.connections
            .get(member_id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|connection| connection.is_active())
    }

    pub(crate) fn connection_to_address(&self, address: SocketAddr) -> Option<Arc<Connection>> {
        self.connections
            .iter()
            .find(|entry| entry.address() == address && entry.is_active())
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn refresh_load_balancer(&self) {
        let members = self.members.load();
        let ids = if members.is_empty() {
            self.connections.iter().map(|entry| *entry.key()).collect()
        } else {
            members.member_ids()
        };
        self.load_balancer.set_members(ids);
    }

    /// Clears the cluster-events slot if it still holds `connection`.
    pub(crate) fn release_cluster_events(&self, connection: &Connection) -> bool {
        let mut slot = self.cluster_events.lock();
        match slot.as_ref() {
            Some(current) if current.id() == connection.id() => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// True while live connections exist but none owns the cluster views,
    /// as after an election ran out of candidates.
    fn lacks_cluster_events_connection(&self) -> bool {
        self.cluster_events.lock().is_none() && !self.connections.is_empty()
    }

    fn forget_installations(&self, connection: &Connection) {
        let subscriptions = self
            .subscriptions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .chain(std::iter::once(Arc::clone(&self.cluster_view)));

        for subscription in subscriptions {
            if let Some(installation) = subscription.remove_installation(connection.id()) {
                self.correlated.remove(&installation.correlation_id());
            }
        }
    }

    fn connection_closed(self: &Arc<Self>, connection: &Connection, reason: &str) {
        let removed = connection.member_id().is_some_and(|member_id| {
            self.connections
                .remove_if(&member_id, |_, registered| registered.id() == connection.id())
                .is_some()
        });

        self.forget_installations(connection);

        if removed {
            tracing::info!(
                id = %connection.id(),
                address = %connection.address(),
                reason = reason,
                "removed connection from the cluster"
            );
            let _ = self.events.send(ClusterEvent::ConnectionRemoved {
                id: connection.id(),
                address: connection.address(),
                member_id: connection.member_id(),
            });
            if self.connections.is_empty() && self.connected.swap(false, Ordering::AcqRel) {
                tracing::warn!("lost every connection to the cluster");
                let _ = self.lifecycle.send(LifecycleEvent::ClientDisconnected);
            }
        }

        if self.shutdown.is_cancelled() {
            return;
        }
        let lost_owner = self.release_cluster_events(connection);
        if lost_owner {
            tracing::info!(id = %connection.id(), "cluster events connection lost");
        }
        if lost_owner || self.lacks_cluster_events_connection() {
            let state = Arc::clone(self);
            tokio::spawn(async move { state.elect_cluster_events_connection().await });
        }
    }

    fn dispatch_event(&self, connection: &Connection, event: ClientMessage) {
        let Some(correlation_id) = event.correlation_id() else {
            tracing::warn!(id = %connection.id(), "dropping event without a correlation id");
            return;
        };

        let Some(subscription) = self
            .correlated
            .get(&correlation_id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            tracing::trace!(
                correlation_id = correlation_id,
                "dropping event without a subscription"
            );
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| subscription.handle(&event, connection))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    subscription = %subscription.id(),
                    correlation_id = correlation_id,
                    error = %e,
                    "event handler failed"
                );
            }
            Err(_) => {
                subscription.record_handler_error();
                tracing::error!(
                    subscription = %subscription.id(),
                    correlation_id = correlation_id,
                    "event handler panicked"
                );
            }
        }
    }
}

/// Connects every connection's callbacks back to its cluster.
pub(crate) struct ClusterHooks {
    state: Weak<ClusterState>,
}

impl ConnectionObserver for ClusterHooks {
    fn on_event(&self, connection: &Connection, event: ClientMessage) {
        if let Some(state) = self.state.upgrade() {
            state.dispatch_event(connection, event);
        }
    }

    fn on_closed(&self, connection: &Connection, reason: &str) {
        if let Some(state) = self.state.upgrade() {
            state.connection_closed(connection, reason);
        }
    }
}

/// Client-side view of a Hazelcast cluster.
///
/// Owns the connections to the members, keeps the member and partition
/// tables current, routes requests to the right connection and keeps event
/// subscriptions installed across connection churn.
///
/// # Example
///
/// ```ignore
/// let cluster = Cluster::builder(config)
///     .authentication_codec(my_auth_codec)
///     .cluster_view_codec(my_view_codec)
///     .build()?;
///
/// cluster.connect(&CancellationToken::new()).await?;
/// let response = cluster
///     .send_to_key_owner(request, &serialized_key, &CancellationToken::new())
///     .await?;
/// ```
#[derive(Clone)]
pub struct Cluster {
    pub(crate) inner: Arc<ClusterState>,
}

impl Cluster {
    /// Starts building a cluster from the given configuration.
    pub fn builder(config: ClientConfig) -> ClusterBuilder {
        ClusterBuilder::new(config)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the unique id of this client.
    pub fn client_id(&self) -> Uuid {
        self.inner.client_id
    }

    /// Returns every registered connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.connection_snapshot()
    }

    /// Returns the number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Returns the live connection to a member.
    pub fn connection(&self, member_id: &Uuid) -> Option<Arc<Connection>> {
        self.inner.connection_to_member(member_id)
    }

    /// Returns the current membership snapshot.
    pub fn member_table(&self) -> Arc<MemberTable> {
        self.inner.members.load_full()
    }

    /// Returns the current members.
    pub fn members(&self) -> Vec<MemberInfo> {
        self.inner.members.load().members().cloned().collect()
    }

    /// Returns a member of the current snapshot.
    pub fn member(&self, member_id: &Uuid) -> Option<MemberInfo> {
        self.inner.members.load().get(member_id).cloned()
    }

    /// Returns the partition count, or 0 before the first connection.
    pub fn partition_count(&self) -> usize {
        self.inner.partitioner.partition_count()
    }

    /// Returns the owner of a partition.
    pub fn partition_owner(&self, partition_id: i32) -> Option<Uuid> {
        self.inner.partitioner.partition_owner(partition_id)
    }

    /// Returns the partition a serialized key belongs to.
    pub fn partition_id(&self, key: &[u8]) -> Result<i32> {
        self.inner.partitioner.partition_id(key)
    }

    /// Returns the connection currently receiving cluster view events.
    pub fn cluster_events_connection(&self) -> Option<Arc<Connection>> {
        self.inner.cluster_events.lock().clone()
    }

    /// Returns the number of installed subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Returns an installed subscription.
    pub fn subscription(&self, id: &Uuid) -> Option<Arc<ClusterSubscription>> {
        self.inner
            .subscriptions
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle.subscribe()
    }

    /// Subscribes to connection, member and partition events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.inner.events.subscribe()
    }

    /// Returns true once shutdown has begun.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    /// Connects to the cluster.
    ///
    /// Tries the discovered addresses, and the addresses of known members,
    /// until one connection is established, waiting between passes as
    /// configured by [`RetryConfig`](crate::config::RetryConfig). Returns
    /// once the first member view has been received.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::ClusterUnreachable`] listing every address
    /// tried and every failure once the connect timeout has elapsed.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.connect_to_cluster(cancel).await
    }

    /// Connects to one address, or returns the existing connection to it.
    pub async fn connect_to_address(
        &self,
        address: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<Arc<Connection>> {
        self.inner.connect_to_address(address, cancel).await
    }

    /// Sends a request to the owner of a serialized key's partition.
    pub async fn send_to_key_owner(
        &self,
        message: ClientMessage,
        key: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner.send_to_key_owner(message, key, cancel).await
    }

    /// Sends a request to the owner of a partition.
    pub async fn send_to_partition_owner(
        &self,
        message: ClientMessage,
        partition_id: i32,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner
            .send_to_partition_owner(message, partition_id, cancel)
            .await
    }

    /// Sends a request to a member chosen by the load balancer.
    pub async fn send_to_random(
        &self,
        message: ClientMessage,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner.send_to_random(message, cancel).await
    }

    /// Sends a request to a specific member.
    pub async fn send_to_member(
        &self,
        message: ClientMessage,
        member_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner.send_to_member(message, member_id, cancel).await
    }

    /// Sends a request over one connection; never retried elsewhere.
    pub async fn send_to_connection(
        &self,
        message: ClientMessage,
        connection: Arc<Connection>,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner
            .send_to_connection(message, connection, cancel)
            .await
    }

    /// Runs an invocation with routing, retries and the invocation timeout.
    pub async fn invoke(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.inner.invoke(invocation, cancel).await
    }

    /// Registers a subscription and installs it on every connection.
    ///
    /// # Errors
    ///
    /// Fails if a subscription with the same id is installed, or if any
    /// connection rejects it. On failure the subscription is unregistered,
    /// but members that accepted it before the failure keep it until
    /// their connection closes.
    pub async fn install_subscription(
        &self,
        subscription: Arc<ClusterSubscription>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.inner.install_subscription(subscription, cancel).await
    }

    /// Removes a subscription from every connection and unregisters it.
    ///
    /// Returns false if no such subscription was installed.
    pub async fn remove_subscription(&self, id: Uuid, cancel: &CancellationToken) -> Result<bool> {
        self.inner.remove_subscription(id, cancel).await
    }

    /// Shuts the cluster down.
    ///
    /// Stops the heartbeat, closes every connection and fails their pending
    /// invocations. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("client_id", &self.inner.client_id)
            .field("cluster_name", &self.inner.config.cluster_name())
            .field("connections", &self.inner.connections.len())
            .field("members", &self.inner.members.load().len())
            .finish()
    }
}

/// Builder for [`Cluster`].
///
/// The authentication and cluster view codecs are required; discovery
/// defaults to the configured addresses, credentials to the configured
/// security settings and load balancing to round-robin.
pub struct ClusterBuilder {
    config: ClientConfig,
    discovery: Option<Arc<dyn ClusterDiscovery>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    credentials: Option<Arc<dyn CredentialsFactory>>,
    view_codec: Option<Arc<dyn ClusterViewCodec>>,
    load_balancer: Option<Arc<dyn LoadBalancer>>,
}

impl ClusterBuilder {
    /// Creates a builder for the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            discovery: None,
            authenticator: None,
            credentials: None,
            view_codec: None,
            load_balancer: None,
        }
    }

    /// Sets the source of candidate member addresses.
    pub fn discovery(mut self, discovery: impl ClusterDiscovery + 'static) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    /// Sets the authenticator used on every new connection.
    pub fn authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }

    /// Authenticates with a [`CodecAuthenticator`] over the given codec.
    pub fn authentication_codec(self, codec: impl AuthenticationCodec + 'static) -> Self {
        self.authenticator(CodecAuthenticator::new(Arc::new(codec)))
    }

    /// Sets the source of credentials.
    pub fn credentials(mut self, credentials: impl CredentialsFactory + 'static) -> Self {
        self.credentials = Some(Arc::new(credentials));
        self
    }

    /// Sets the codec of the cluster view subscription.
    pub fn cluster_view_codec(mut self, codec: impl ClusterViewCodec + 'static) -> Self {
        self.view_codec = Some(Arc::new(codec));
        self
    }

    /// Sets the load balancer.
    pub fn load_balancer(mut self, load_balancer: impl LoadBalancer + 'static) -> Self {
        self.load_balancer = Some(Arc::new(load_balancer));
        self
    }

    /// Builds the cluster without connecting it.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::Configuration`] if no authenticator or no
    /// cluster view codec was set.
    pub fn build(self) -> Result<Cluster> {
        let authenticator = self.authenticator.ok_or_else(|| {
            HazelcastError::Configuration("cluster requires an authenticator".into())
        })?;
        let view_codec = self.view_codec.ok_or_else(|| {
            HazelcastError::Configuration("cluster requires a cluster view codec".into())
        })?;
        let discovery = self.discovery.unwrap_or_else(|| {
            Arc::new(StaticAddressDiscovery::from_config(self.config.network()))
        });
        let credentials = self.credentials.unwrap_or_else(|| {
            Arc::new(StaticCredentialsFactory::from_config(self.config.security()))
        });
        let load_balancer = self.load_balancer.unwrap_or_else(default_load_balancer);
        let config = self.config;

        let inner = Arc::new_cyclic(|state: &Weak<ClusterState>| {
            let cluster_view = Arc::new(cluster_view_subscription(
                Weak::clone(state),
                Arc::clone(&view_codec),
            ));
            let (lifecycle, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);
            let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

            ClusterState {
                config,
                client_id: Uuid::new_v4(),
                discovery,
                authenticator,
                credentials,
                load_balancer,
                sequence: Arc::new(CorrelationIdSequence::new()),
                hooks: Arc::new(ClusterHooks {
                    state: Weak::clone(state),
                }),
                connections: DashMap::new(),
                address_locks: DashMap::new(),
                connected: AtomicBool::new(false),
                members: ArcSwap::from_pointee(MemberTable::empty()),
                first_members: AtomicBool::new(false),
                members_gate: watch::channel(false).0,
                partitioner: Partitioner::new(),
                cluster_events: Mutex::new(None),
                cluster_view,
                subscriptions: DashMap::new(),
                correlated: DashMap::new(),
                lifecycle,
                events,
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                shutting_down: AtomicBool::new(false),
                heartbeat: Mutex::new(None),
            }
        });

        Ok(Cluster { inner })
    }
}

fn cluster_view_subscription(
    state: Weak<ClusterState>,
    codec: Arc<dyn ClusterViewCodec>,
) -> ClusterSubscription {
    let request = codec.encode_add_listener_request();
    let handler = move |event: &ClientMessage, connection: &Connection| -> Result<()> {
        let Some(state) = state.upgrade() else {
            return Ok(());
        };
        let event = codec.decode_event(event)?;
        state.handle_cluster_view_event(connection.id(), event);
        Ok(())
    };

    // The cluster view listener has no member-side id and ends with its
    // connection.
    ClusterSubscription::new(
        Uuid::new_v4(),
        request,
        Box::new(|_: &ClientMessage| -> Result<Uuid> { Ok(Uuid::nil()) }),
        None,
        Box::new(assume_removed),
        Arc::new(handler),
    )
}
