//! Cluster-wide event subscriptions and their per-connection installations.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use hazelcast_wire::protocol::ClientMessage;
use hazelcast_wire::{HazelcastError, Result};
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};

/// Handles the events of one subscription.
///
/// Called on the receive task of the connection the event arrived on, so
/// it must not block.
pub trait EventHandler: Send + Sync {
    /// Handles one event message.
    fn handle(&self, event: &ClientMessage, connection: &Connection) -> Result<()>;
}

impl<F> EventHandler for F
where
    F: Fn(&ClientMessage, &Connection) -> Result<()> + Send + Sync,
{
    fn handle(&self, event: &ClientMessage, connection: &Connection) -> Result<()> {
        self(event, connection)
    }
}

type SubscribeDecoder = Box<dyn Fn(&ClientMessage) -> Result<Uuid> + Send + Sync>;
type UnsubscribeEncoder = Box<dyn Fn(Uuid) -> ClientMessage + Send + Sync>;
type UnsubscribeDecoder = Box<dyn Fn(&ClientMessage) -> Result<bool> + Send + Sync>;

/// Installation of a [`ClusterSubscription`] on one connection.
#[derive(Debug, Clone)]
pub struct ClientSubscription {
    subscription_id: Uuid,
    connection: Arc<Connection>,
    server_subscription_id: Uuid,
    correlation_id: i64,
}

impl ClientSubscription {
    pub(crate) fn new(
        subscription_id: Uuid,
        connection: Arc<Connection>,
        server_subscription_id: Uuid,
        correlation_id: i64,
    ) -> Self {
        Self {
            subscription_id,
            connection,
            server_subscription_id,
            correlation_id,
        }
    }

    /// Returns the id of the owning cluster subscription.
    pub fn subscription_id(&self) -> Uuid {
        self.subscription_id
    }

    /// Returns the connection the subscription is installed on.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Returns the id the member assigned to this installation.
    pub fn server_subscription_id(&self) -> Uuid {
        self.server_subscription_id
    }

    /// Returns the correlation id events of this installation carry.
    pub fn correlation_id(&self) -> i64 {
        self.correlation_id
    }
}

/// A logical subscription to a server-pushed event stream, installed on
/// every connection of the cluster.
///
/// Once deactivated no more events reach the handler, even before the
/// members have confirmed the unsubscribe.
pub struct ClusterSubscription {
    id: Uuid,
    subscribe_request: ClientMessage,
    decode_subscribe_response: SubscribeDecoder,
    unsubscribe_request: Option<UnsubscribeEncoder>,
    decode_unsubscribe_response: UnsubscribeDecoder,
    handler: Arc<dyn EventHandler>,
    active: AtomicBool,
    installations: DashMap<ConnectionId, ClientSubscription>,
    installing: DashSet<ConnectionId>,
    events_received: AtomicU64,
    handler_errors: AtomicU64,
}

impl ClusterSubscription {
    /// Starts building a subscription sent with the given request.
    pub fn builder(subscribe_request: ClientMessage) -> ClusterSubscriptionBuilder {
        ClusterSubscriptionBuilder::new(subscribe_request)
    }

    pub(crate) fn new(
        id: Uuid,
        subscribe_request: ClientMessage,
        decode_subscribe_response: SubscribeDecoder,
        unsubscribe_request: Option<UnsubscribeEncoder>,
        decode_unsubscribe_response: UnsubscribeDecoder,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        Self {
            id,
            subscribe_request,
            decode_subscribe_response,
            unsubscribe_request,
            decode_unsubscribe_response,
            handler,
            active: AtomicBool::new(true),
            installations: DashMap::new(),
            installing: DashSet::new(),
            events_received: AtomicU64::new(0),
            handler_errors: AtomicU64::new(0),
        }
    }

    /// Returns the subscription's unique id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns true until the subscription is deactivated.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops event delivery. Returns false if it was already inactive.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Returns a copy of the subscribe request.
    pub fn subscribe_request(&self) -> ClientMessage {
        self.subscribe_request.clone()
    }

    /// Decodes the member-assigned id from a subscribe response.
    pub fn decode_subscribe_response(&self, response: &ClientMessage) -> Result<Uuid> {
        (self.decode_subscribe_response)(response)
    }

    /// Builds the unsubscribe request for one installation, or `None` if the
    /// subscription ends only with its connection.
    pub fn unsubscribe_request(&self, server_subscription_id: Uuid) -> Option<ClientMessage> {
        self.unsubscribe_request
            .as_ref()
            .map(|encode| encode(server_subscription_id))
    }

    /// Decodes an unsubscribe response.
    pub fn decode_unsubscribe_response(&self, response: &ClientMessage) -> Result<bool> {
        (self.decode_unsubscribe_response)(response)
    }

    /// Delivers an event to the handler, unless the subscription is inactive.
    pub fn handle(&self, event: &ClientMessage, connection: &Connection) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        self.events_received.fetch_add(1, Ordering::Relaxed);
        let result = self.handler.handle(event, connection);
        if result.is_err() {
            self.handler_errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub(crate) fn record_handler_error(&self) {
        self.handler_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of events delivered to the handler.
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Returns the number of events the handler failed on.
    pub fn handler_errors(&self) -> u64 {
        self.handler_errors.load(Ordering::Relaxed)
    }

    /// Claims the right to install on `connection`.
    ///
    /// Returns `None` if the subscription is already installed there or
    /// another install on it is in flight. The claim is released when the
    /// returned guard drops, which must happen after the installation has
    /// been recorded.
    pub(crate) fn reserve_installation(
        &self,
        connection: ConnectionId,
    ) -> Option<InstallReservation<'_>> {
        if !self.installing.insert(connection) {
            return None;
        }
        let reservation = InstallReservation {
            subscription: self,
            connection,
        };
        if self.installations.contains_key(&connection) {
            return None;
        }
        Some(reservation)
    }

    pub(crate) fn add_installation(&self, installation: ClientSubscription) {
        self.installations
            .insert(installation.connection.id(), installation);
    }

    pub(crate) fn remove_installation(&self, connection: ConnectionId) -> Option<ClientSubscription> {
        self.installations.remove(&connection).map(|(_, installation)| installation)
    }

    /// Returns the installation on the given connection.
    pub fn installation(&self, connection: ConnectionId) -> Option<ClientSubscription> {
        self.installations.get(&connection).map(|entry| entry.clone())
    }

    /// Returns every current installation.
    pub fn installations(&self) -> Vec<ClientSubscription> {
        self.installations.iter().map(|entry| entry.clone()).collect()
    }

    /// Returns the number of connections the subscription is installed on.
    pub fn installation_count(&self) -> usize {
        self.installations.len()
    }
}

impl std::fmt::Debug for ClusterSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSubscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .field("installations", &self.installations.len())
            .finish()
    }
}

/// In-flight install of a subscription on one connection.
pub(crate) struct InstallReservation<'a> {
    subscription: &'a ClusterSubscription,
    connection: ConnectionId,
}

impl Drop for InstallReservation<'_> {
    fn drop(&mut self) {
        self.subscription.installing.remove(&self.connection);
    }
}

/// Builder for [`ClusterSubscription`].
pub struct ClusterSubscriptionBuilder {
    id: Option<Uuid>,
    subscribe_request: ClientMessage,
    decode_subscribe_response: Option<SubscribeDecoder>,
    unsubscribe_request: Option<UnsubscribeEncoder>,
    decode_unsubscribe_response: Option<UnsubscribeDecoder>,
    handler: Option<Arc<dyn EventHandler>>,
}

impl ClusterSubscriptionBuilder {
    fn new(subscribe_request: ClientMessage) -> Self {
        Self {
            id: None,
            subscribe_request,
            decode_subscribe_response: None,
            unsubscribe_request: None,
            decode_unsubscribe_response: None,
            handler: None,
        }
    }

    /// Uses the given id instead of a random one.
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets how the member-assigned id is read from a subscribe response.
    pub fn decode_subscribe_response<F>(mut self, decode: F) -> Self
    where
        F: Fn(&ClientMessage) -> Result<Uuid> + Send + Sync + 'static,
    {
        self.decode_subscribe_response = Some(Box::new(decode));
        self
    }

    /// Sets how the unsubscribe request for one installation is built.
    ///
    /// Without it, removing the subscription only drops it locally.
    pub fn unsubscribe_request<F>(mut self, encode: F) -> Self
    where
        F: Fn(Uuid) -> ClientMessage + Send + Sync + 'static,
    {
        self.unsubscribe_request = Some(Box::new(encode));
        self
    }

    /// Sets how an unsubscribe response is decoded.
    pub fn decode_unsubscribe_response<F>(mut self, decode: F) -> Self
    where
        F: Fn(&ClientMessage) -> Result<bool> + Send + Sync + 'static,
    {
        self.decode_unsubscribe_response = Some(Box::new(decode));
        self
    }

    /// Sets the event handler.
    pub fn handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Builds the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`HazelcastError::Configuration`] if no handler or no
    /// subscribe response decoder was set.
    pub fn build(self) -> Result<ClusterSubscription> {
        let handler = self.handler.ok_or_else(|| {
            HazelcastError::Configuration("subscription requires an event handler".into())
        })?;
        let decode_subscribe_response = self.decode_subscribe_response.ok_or_else(|| {
            HazelcastError::Configuration(
                "subscription requires a subscribe response decoder".into(),
            )
        })?;

        Ok(ClusterSubscription::new(
            self.id.unwrap_or_else(Uuid::new_v4),
            self.subscribe_request,
            decode_subscribe_response,
            self.unsubscribe_request,
            self.decode_unsubscribe_response
                .unwrap_or_else(|| Box::new(assume_removed)),
            handler,
        ))
    }
}

pub(crate) fn assume_removed(_response: &ClientMessage) -> Result<bool> {
    Ok(true)
}
