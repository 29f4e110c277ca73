//! Choosing a connection for each request and retrying failed attempts.

use std::sync::Arc;

use hazelcast_wire::protocol::ClientMessage;
use hazelcast_wire::{HazelcastError, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cluster::cluster::ClusterState;
use crate::connection::Connection;
use crate::invocation::{DeadlineToken, Invocation, InvocationTarget};

impl ClusterState {
    pub(crate) async fn send_to_key_owner(
        &self,
        message: ClientMessage,
        key: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        let partition_id = self.partitioner.partition_id(key)?;
        self.send_to_partition_owner(message, partition_id, cancel)
            .await
    }

    pub(crate) async fn send_to_partition_owner(
        &self,
        mut message: ClientMessage,
        partition_id: i32,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        message.set_partition_id(partition_id);
        let invocation = Invocation::new(message, InvocationTarget::Partition(partition_id));
        self.invoke(invocation, cancel).await
    }

    pub(crate) async fn send_to_random(
        &self,
        message: ClientMessage,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.invoke(Invocation::new(message, InvocationTarget::Random), cancel)
            .await
    }

    pub(crate) async fn send_to_member(
        &self,
        message: ClientMessage,
        member_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.invoke(
            Invocation::new(message, InvocationTarget::Member(member_id)),
            cancel,
        )
        .await
    }

    pub(crate) async fn send_to_connection(
        &self,
        message: ClientMessage,
        connection: Arc<Connection>,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        self.invoke(
            Invocation::new(message, InvocationTarget::Connection(connection)),
            cancel,
        )
        .await
    }

    /// Sends an invocation until it succeeds, fails with an error that may
    /// not be retried, or runs out of time.
    ///
    /// Every attempt gets a fresh correlation id. The invocation timeout
    /// covers all attempts and the waits between them.
    pub(crate) async fn invoke(
        &self,
        mut invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        let invocation_timeout = self.config.invocation().invocation_timeout();
        let deadline = DeadlineToken::new(cancel, invocation_timeout);
        let redo = self.config.network().redo_operation();

        loop {
            let error = match self.resolve(invocation.target()) {
                Ok(connection) => {
                    let (correlation_id, message) = invocation.begin_attempt(&self.sequence);
                    match connection
                        .send_correlated(message, correlation_id, deadline.token())
                        .await
                    {
                        Ok(response) => return Ok(response),
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            if deadline.token().is_cancelled() {
                if cancel.is_cancelled() {
                    return Err(error);
                }
                return Err(HazelcastError::Timeout(format!(
                    "invocation did not complete within {:?} after {} attempts: {}",
                    invocation_timeout,
                    invocation.attempts(),
                    error
                )));
            }

            if self.shutdown.is_cancelled() || !invocation.can_retry(&error, redo) {
                return Err(error);
            }

            let delay = self.config.invocation().retry_delay(invocation.attempts());
            tracing::debug!(
                attempts = invocation.attempts(),
                delay = ?delay,
                error = %error,
                "retrying invocation"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = deadline.token().cancelled() => {}
            }
        }
    }

    fn resolve(&self, target: &InvocationTarget) -> Result<Arc<Connection>> {
        if self.shutdown.is_cancelled() {
            return Err(HazelcastError::ClientNotActive("cluster is shut down".into()));
        }

        if let InvocationTarget::Connection(connection) = target {
            return if connection.is_active() {
                Ok(Arc::clone(connection))
            } else {
                Err(HazelcastError::ClientNotActive(format!(
                    "connection to {} is closed",
                    connection.address()
                )))
            };
        }

        if !self.config.network().smart_routing() {
            return self.any_connection();
        }

        match target {
            InvocationTarget::Partition(partition_id) => {
                match self
                    .partitioner
                    .partition_owner(*partition_id)
                    .and_then(|owner| self.connection_to_member(&owner))
                {
                    Some(connection) => Ok(connection),
                    None => self.random_connection(),
                }
            }
            InvocationTarget::Member(member_id) => {
                self.connection_to_member(member_id).ok_or_else(|| {
                    HazelcastError::NoConnection(format!("no connection to member {}", member_id))
                })
            }
            _ => self.random_connection(),
        }
    }

    /// Returns the connection to a member picked by the load balancer.
    ///
    /// Members the client has no connection to are skipped, at most once
    /// per known member, before falling back to any connection.
    fn random_connection(&self) -> Result<Arc<Connection>> {
        let attempts = self.members.load().len().max(1);
        for _ in 0..attempts {
            let Some(member_id) = self.load_balancer.select() else {
                break;
            };
            if let Some(connection) = self.connection_to_member(&member_id) {
                return Ok(connection);
            }
        }
        self.any_connection()
    }

    fn any_connection(&self) -> Result<Arc<Connection>> {
        self.connections
            .iter()
            .find(|entry| entry.is_active())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| HazelcastError::NoConnection("no connection to the cluster".into()))
    }
}
