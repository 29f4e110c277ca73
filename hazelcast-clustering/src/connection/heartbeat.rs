//! Failure detection for idle and unresponsive connections.

use std::sync::Arc;

use futures::future::join_all;
use hazelcast_wire::protocol::{ClientMessage, CLIENT_PING, PARTITION_ID_ANY};
use hazelcast_wire::HazelcastError;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::HeartbeatConfig;
use crate::connection::Connection;
use crate::invocation::DeadlineToken;

/// Periodically checks every connection.
///
/// A connection that has read nothing for longer than the heartbeat
/// timeout is shut down. A connection that has written nothing for longer
/// than the period is pinged, and shut down if the ping fails or does not
/// complete within the ping timeout.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    config: HeartbeatConfig,
}

impl Heartbeat {
    /// Creates a heartbeat with the given timings.
    pub fn new(config: HeartbeatConfig) -> Self {
        Self { config }
    }

    /// Returns the heartbeat timings.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Runs one cycle over the given connections.
    ///
    /// Pings run concurrently; the cycle completes once every connection has
    /// been checked.
    pub async fn run_cycle(&self, connections: Vec<Arc<Connection>>, cancel: &CancellationToken) {
        let now = Instant::now();
        let checks = connections
            .into_iter()
            .filter(|connection| connection.is_active())
            .map(|connection| self.check(connection, now, cancel));
        join_all(checks).await;
    }

    async fn check(&self, connection: Arc<Connection>, now: Instant, cancel: &CancellationToken) {
        let read_silence = now.saturating_duration_since(connection.last_read_at());
        if read_silence > self.config.timeout() {
            tracing::warn!(
                id = %connection.id(),
                address = %connection.address(),
                silence = ?read_silence,
                "no messages received within the heartbeat timeout"
            );
            connection.shutdown("heartbeat timeout").await;
            return;
        }

        let write_idle = now.saturating_duration_since(connection.last_write_at());
        if write_idle <= self.config.period() {
            return;
        }

        let deadline = DeadlineToken::new(cancel, self.config.ping_timeout());
        let ping = ClientMessage::create_for_encode(CLIENT_PING, PARTITION_ID_ANY);
        match connection.send(ping, deadline.token()).await {
            Ok(_) => {
                tracing::trace!(id = %connection.id(), "heartbeat ping acknowledged");
            }
            Err(HazelcastError::Cancelled(_)) if cancel.is_cancelled() => {}
            Err(e) => {
                tracing::warn!(
                    id = %connection.id(),
                    address = %connection.address(),
                    error = %e,
                    "heartbeat ping failed"
                );
                connection.shutdown("heartbeat ping failed").await;
            }
        }
    }

    /// Spawns the heartbeat loop.
    ///
    /// `connections` is asked for the current connections on every tick.
    /// The loop stops when `shutdown` fires.
    pub fn spawn<F>(self, connections: F, shutdown: CancellationToken) -> JoinHandle<()>
    where
        F: Fn() -> Vec<Arc<Connection>> + Send + Sync + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.period());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle(connections(), &shutdown).await;
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("heartbeat task shutting down");
                        break;
                    }
                }
            }
        })
    }
}
