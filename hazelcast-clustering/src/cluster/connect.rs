//! Connecting to the cluster and bringing new connections into service.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use hazelcast_wire::{HazelcastError, Result};
use rand::seq::SliceRandom;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::cluster::cluster::ClusterState;
use crate::cluster::ClusterEvent;
use crate::connection::{merge_candidates, Connection, Heartbeat, RetryStrategy};
use crate::invocation::DeadlineToken;
use crate::listener::LifecycleEvent;
use crate::security::{AuthenticationContext, AuthenticationResult};

impl ClusterState {
    #[instrument(
        name = "cluster.connect",
        skip(self, cancel),
        fields(cluster = %self.config.cluster_name())
    )]
    pub(crate) async fn connect_to_cluster(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(HazelcastError::ClientNotActive("cluster is shut down".into()));
        }

        let first_start = !self.started.swap(true, Ordering::AcqRel);
        if first_start {
            let _ = self.lifecycle.send(LifecycleEvent::Starting);
            tracing::debug!("client lifecycle: Starting");
        }

        let mut retry = RetryStrategy::from_config(self.config.retry());
        let mut tried: Vec<SocketAddr> = Vec::new();
        let mut failures: Vec<String> = Vec::new();

        'passes: loop {
            let discovered = match self.discovery.discover().await {
                Ok(addresses) => addresses,
                Err(e) => {
                    tracing::warn!(error = %e, "address discovery failed");
                    failures.push(format!("discovery: {}", e));
                    Vec::new()
                }
            };
            let known = self
                .members
                .load()
                .members()
                .map(|m| m.address())
                .collect::<Vec<_>>();
            let candidates = merge_candidates(discovered, known);
            tracing::debug!(
                candidates = candidates.len(),
                attempt = retry.attempts(),
                "connecting to cluster"
            );

            for address in candidates {
                if cancel.is_cancelled() {
                    return Err(HazelcastError::Cancelled("connect to cluster cancelled".into()));
                }
                if !tried.contains(&address) {
                    tried.push(address);
                }

                match self.connect_to_address(address, cancel).await {
                    Ok(connection) => {
                        tracing::info!(
                            address = %address,
                            member = ?connection.member_id(),
                            "connected to cluster"
                        );
                        break 'passes;
                    }
                    Err(HazelcastError::Cancelled(reason)) if cancel.is_cancelled() => {
                        return Err(HazelcastError::Cancelled(reason));
                    }
                    Err(e) => {
                        tracing::warn!(
                            address = %address,
                            error = %e,
                            "failed to connect to address"
                        );
                        failures.push(format!("{}: {}", address, e));
                    }
                }
            }

            if !retry.wait(cancel).await? {
                tracing::error!(
                    addresses = tried.len(),
                    elapsed = ?retry.elapsed(),
                    "unable to connect to the cluster"
                );
                return Err(HazelcastError::ClusterUnreachable {
                    addresses: tried,
                    failures,
                });
            }
        }

        self.start_heartbeat();
        self.wait_for_first_members(cancel).await?;

        if first_start {
            let _ = self.lifecycle.send(LifecycleEvent::Started);
            tracing::debug!("client lifecycle: Started");
        }
        Ok(())
    }

    async fn wait_for_first_members(&self, cancel: &CancellationToken) -> Result<()> {
        let mut gate = self.members_gate.subscribe();
        let wait = timeout(
            self.config.retry().cluster_connect_timeout(),
            gate.wait_for(|received| *received),
        );

        tokio::select! {
            result = wait => match result {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(_)) => Err(HazelcastError::ClientNotActive("cluster is shut down".into())),
                Err(_) => Err(HazelcastError::Timeout(
                    "no member list received from the cluster".into(),
                )),
            },
            _ = cancel.cancelled() => {
                Err(HazelcastError::Cancelled("waiting for the member list cancelled".into()))
            }
        }
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let mut slot = self.heartbeat.lock();
        if slot.is_some() {
            return;
        }

        let state = Arc::downgrade(self);
        let connections = move || {
            state
                .upgrade()
                .map(|state| state.connection_snapshot())
                .unwrap_or_default()
        };
        let heartbeat = Heartbeat::new(self.config.heartbeat().clone());
        *slot = Some(heartbeat.spawn(connections, self.shutdown.clone()));
        tracing::debug!(period = ?self.config.heartbeat().period(), "heartbeat started");
    }

    /// Opens and sets up a connection to `address`, unless one exists.
    ///
    /// Attempts to the same address are serialized: a caller that waited
    /// for another caller's attempt gets the connection it produced.
    #[instrument(
        name = "cluster.connect_to_address",
        skip(self, address, cancel),
        fields(address = %address)
    )]
    pub(crate) async fn connect_to_address(
        self: &Arc<Self>,
        address: SocketAddr,
        cancel: &CancellationToken,
    ) -> Result<Arc<Connection>> {
        let lock = self
            .address_locks
            .entry(address)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();

        let _guard = tokio::select! {
            guard = lock.lock() => guard,
            _ = cancel.cancelled() => {
                return Err(HazelcastError::Cancelled(format!(
                    "connect to {} cancelled",
                    address
                )));
            }
        };

        if let Some(existing) = self.connection_to_address(address) {
            tracing::trace!("reusing existing connection");
            return Ok(existing);
        }
        if self.shutdown.is_cancelled() {
            return Err(HazelcastError::ClientNotActive("cluster is shut down".into()));
        }

        let connect = Connection::connect(
            address,
            self.config.network().connection_timeout(),
            Arc::clone(&self.sequence),
            self.hooks.clone(),
        );
        let connection = tokio::select! {
            result = connect => result?,
            _ = cancel.cancelled() => {
                return Err(HazelcastError::Cancelled(format!(
                    "connect to {} cancelled",
                    address
                )));
            }
        };

        match self.setup_connection(&connection, cancel).await {
            Ok(registered) => Ok(registered),
            Err(e) => {
                connection.shutdown(&format!("connection setup failed: {}", e)).await;
                Err(e)
            }
        }
    }

    /// Authenticates and registers a new connection.
    ///
    /// Returns the registered connection, which is an older one if the
    /// member already had a live connection.
    async fn setup_connection(
        self: &Arc<Self>,
        connection: &Arc<Connection>,
        cancel: &CancellationToken,
    ) -> Result<Arc<Connection>> {
        let result = self.authenticate(connection, cancel).await?;
        connection.set_member_id(result.member_id);
        self.partitioner.set_partition_count(result.partition_count)?;

        let existing = match self.connections.entry(result.member_id) {
            Entry::Occupied(entry) if entry.get().is_active() => Some(Arc::clone(entry.get())),
            Entry::Occupied(mut entry) => {
                entry.insert(Arc::clone(connection));
                None
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(connection));
                None
            }
        };
        if let Some(existing) = existing {
            tracing::debug!(member = %result.member_id, "member already connected");
            connection.shutdown("duplicate connection to member").await;
            return Ok(existing);
        }

        if !connection.is_active() {
            self.connections
                .remove_if(&result.member_id, |_, registered| registered.id() == connection.id());
            return Err(HazelcastError::ConnectionClosed(format!(
                "connection to {} closed during setup",
                connection.address()
            )));
        }

        if !self.connected.swap(true, Ordering::AcqRel) {
            let _ = self.lifecycle.send(LifecycleEvent::ClientConnected);
            tracing::debug!("client lifecycle: ClientConnected");
        }
        self.refresh_load_balancer();

        self.claim_cluster_events(connection, cancel).await?;

        let subscriptions: Vec<_> = self
            .subscriptions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .filter(|subscription| subscription.is_active())
            .collect();
        for subscription in subscriptions {
            self.install_on_connection(&subscription, connection, cancel).await?;
        }

        tracing::info!(
            id = %connection.id(),
            address = %connection.address(),
            member = %result.member_id,
            server_version = %result.server_version,
            "authenticated with member"
        );
        let _ = self.events.send(ClusterEvent::ConnectionAdded {
            id: connection.id(),
            address: connection.address(),
            member_id: result.member_id,
        });
        Ok(Arc::clone(connection))
    }

    /// Runs the handshake, retrying once with fresh credentials if the
    /// member rejects them.
    async fn authenticate(
        &self,
        connection: &Connection,
        cancel: &CancellationToken,
    ) -> Result<AuthenticationResult> {
        let context = AuthenticationContext {
            cluster_name: self.config.cluster_name().to_string(),
            client_id: self.client_id,
            client_name: self
                .config
                .client_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("hz.client_{}", self.client_id)),
            labels: self.config.labels().to_vec(),
        };

        let deadline = DeadlineToken::new(cancel, self.config.network().connection_timeout());
        let credentials = self.credentials.new_credentials();
        let first = self
            .authenticator
            .authenticate(connection, &context, &credentials, deadline.token())
            .await;

        let result = match first {
            Err(HazelcastError::Authentication(reason)) => {
                tracing::warn!(
                    address = %connection.address(),
                    reason = %reason,
                    "credentials rejected, retrying with fresh credentials"
                );
                self.credentials.reset();
                let credentials = self.credentials.new_credentials();
                self.authenticator
                    .authenticate(connection, &context, &credentials, deadline.token())
                    .await
            }
            other => other,
        };

        result.map_err(|e| match e {
            HazelcastError::Cancelled(_) if !cancel.is_cancelled() => HazelcastError::Timeout(
                format!("authentication with {} timed out", connection.address()),
            ),
            other => other,
        })
    }

    /// Makes `connection` the cluster-events connection if there is none.
    async fn claim_cluster_events(
        &self,
        connection: &Arc<Connection>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        {
            let mut slot = self.cluster_events.lock();
            if slot.is_some() {
                return Ok(());
            }
            *slot = Some(Arc::clone(connection));
        }

        tracing::debug!(id = %connection.id(), "subscribing to cluster views");
        let cluster_view = Arc::clone(&self.cluster_view);
        self.install_on_connection(&cluster_view, connection, cancel).await
    }

    /// Picks a new cluster-events connection after the previous one died.
    ///
    /// Tries random live connections, at most three times as many as there
    /// are, then gives up until the next connection change.
    pub(crate) async fn elect_cluster_events_connection(self: Arc<Self>) {
        let cancel = self.shutdown.child_token();
        let budget = 3 * self.connections.len();

        for _ in 0..budget {
            if cancel.is_cancelled() {
                return;
            }

            let live: Vec<_> = self
                .connection_snapshot()
                .into_iter()
                .filter(|connection| connection.is_active())
                .collect();
            let picked = {
                let mut rng = rand::thread_rng();
                live.choose(&mut rng).cloned()
            };
            let Some(candidate) = picked else {
                break;
            };

            {
                let mut slot = self.cluster_events.lock();
                if slot.is_some() {
                    return;
                }
                *slot = Some(Arc::clone(&candidate));
            }

            let cluster_view = Arc::clone(&self.cluster_view);
            match self.install_on_connection(&cluster_view, &candidate, &cancel).await {
                Ok(()) => {
                    tracing::info!(
                        id = %candidate.id(),
                        address = %candidate.address(),
                        "elected cluster events connection"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        id = %candidate.id(),
                        error = %e,
                        "failed to subscribe to cluster views"
                    );
                    self.release_cluster_events(&candidate);
                }
            }
        }

        tracing::warn!("no cluster events connection; retrying on the next connection change");
    }

    #[instrument(name = "cluster.shutdown", skip(self))]
    pub(crate) async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.lifecycle.send(LifecycleEvent::ShuttingDown);
        tracing::debug!("client lifecycle: ShuttingDown");

        self.shutdown.cancel();
        let heartbeat = self.heartbeat.lock().take();
        if let Some(heartbeat) = heartbeat {
            let _ = heartbeat.await;
        }

        for connection in self.connection_snapshot() {
            connection.shutdown("cluster shut down").await;
        }

        for entry in self.subscriptions.iter() {
            entry.value().deactivate();
        }
        self.subscriptions.clear();
        self.correlated.clear();
        self.cluster_events.lock().take();
        self.partitioner.reset();

        let _ = self.lifecycle.send(LifecycleEvent::Shutdown);
        tracing::debug!("client lifecycle: Shutdown");
    }
}
