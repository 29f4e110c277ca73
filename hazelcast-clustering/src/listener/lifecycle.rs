//! Cluster lifecycle events.

use std::fmt;

/// Events emitted as the cluster connection moves through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Connecting to the cluster has begun.
    Starting,
    /// The first connection is up and the first member view was received.
    Started,
    /// The first connection to the cluster was established.
    ClientConnected,
    /// The last connection to the cluster was lost.
    ClientDisconnected,
    /// Shutdown has begun.
    ShuttingDown,
    /// Every connection is closed and the heartbeat has stopped.
    Shutdown,
}

impl LifecycleEvent {
    /// Returns a human-readable name for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::ClientConnected => "CLIENT_CONNECTED",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
