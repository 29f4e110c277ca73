//! Installing event subscriptions on every connection.

use std::sync::Arc;

use hazelcast_wire::{HazelcastError, Result};
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::cluster::cluster::ClusterState;
use crate::connection::Connection;
use crate::listener::{ClientSubscription, ClusterSubscription};

impl ClusterState {
    /// Installs `subscription` on one connection.
    ///
    /// The correlation id is registered before the request is written so
    /// that events racing the subscribe response reach the handler. At most
    /// one subscribe request per connection is in flight; a concurrent call
    /// for the same connection returns without sending.
    pub(crate) async fn install_on_connection(
        &self,
        subscription: &Arc<ClusterSubscription>,
        connection: &Arc<Connection>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(_reservation) = subscription.reserve_installation(connection.id()) else {
            return Ok(());
        };

        let correlation_id = self.sequence.next();
        self.correlated
            .insert(correlation_id, Arc::clone(subscription));

        let response = connection
            .send_correlated(subscription.subscribe_request(), correlation_id, cancel)
            .await
            .and_then(|response| subscription.decode_subscribe_response(&response));

        let server_id = match response {
            Ok(server_id) => server_id,
            Err(e) => {
                self.correlated.remove(&correlation_id);
                return Err(e);
            }
        };

        subscription.add_installation(ClientSubscription::new(
            subscription.id(),
            Arc::clone(connection),
            server_id,
            correlation_id,
        ));

        // The connection may have closed after answering; its close hook
        // has then already forgotten installations.
        if !connection.is_active() {
            subscription.remove_installation(connection.id());
            self.correlated.remove(&correlation_id);
            return Err(HazelcastError::ConnectionClosed(format!(
                "connection to {} closed while subscribing",
                connection.address()
            )));
        }

        if !subscription.is_active() {
            subscription.remove_installation(connection.id());
            self.correlated.remove(&correlation_id);
            return Ok(());
        }

        tracing::debug!(
            subscription = %subscription.id(),
            id = %connection.id(),
            server_id = %server_id,
            correlation_id = correlation_id,
            "subscription installed"
        );
        Ok(())
    }

    #[instrument(
        name = "cluster.install_subscription",
        skip(self, subscription, cancel),
        fields(subscription = %subscription.id())
    )]
    pub(crate) async fn install_subscription(
        &self,
        subscription: Arc<ClusterSubscription>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(HazelcastError::ClientNotActive("cluster is shut down".into()));
        }

        match self.subscriptions.entry(subscription.id()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(HazelcastError::Configuration(format!(
                    "subscription {} is already installed",
                    subscription.id()
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&subscription));
            }
        }

        for connection in self.connection_snapshot() {
            if !connection.is_active() {
                continue;
            }
            if let Err(e) = self
                .install_on_connection(&subscription, &connection, cancel)
                .await
            {
                tracing::warn!(
                    id = %connection.id(),
                    address = %connection.address(),
                    error = %e,
                    "failed to install subscription"
                );
                self.discard_subscription(&subscription);
                return Err(e);
            }
        }

        tracing::info!(
            installations = subscription.installation_count(),
            "subscription installed on the cluster"
        );
        Ok(())
    }

    /// Unregisters a subscription and forgets its local installations
    /// without contacting the members.
    fn discard_subscription(&self, subscription: &ClusterSubscription) {
        self.subscriptions.remove(&subscription.id());
        subscription.deactivate();
        for installation in subscription.installations() {
            subscription.remove_installation(installation.connection().id());
            self.correlated.remove(&installation.correlation_id());
        }
    }

    #[instrument(name = "cluster.remove_subscription", skip(self, cancel))]
    pub(crate) async fn remove_subscription(
        &self,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let Some(subscription) = self
            .subscriptions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return Ok(false);
        };

        subscription.deactivate();

        for installation in subscription.installations() {
            let connection = installation.connection();
            let request =
                subscription.unsubscribe_request(installation.server_subscription_id());

            if let Some(request) = request.filter(|_| connection.is_active()) {
                let removed = connection
                    .send(request, cancel)
                    .await
                    .and_then(|response| subscription.decode_unsubscribe_response(&response));
                match removed {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(
                        id = %connection.id(),
                        "member did not know the subscription"
                    ),
                    Err(e) => tracing::debug!(
                        id = %connection.id(),
                        error = %e,
                        "failed to remove subscription from member"
                    ),
                }
            }

            subscription.remove_installation(connection.id());
            self.correlated.remove(&installation.correlation_id());
        }

        self.subscriptions.remove(&id);
        tracing::info!("subscription removed");
        Ok(true)
    }
}
