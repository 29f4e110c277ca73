//! Bookkeeping for requests sent to the cluster.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hazelcast_wire::protocol::ClientMessage;
use hazelcast_wire::HazelcastError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::Connection;

/// Cluster-wide monotonic source of correlation IDs.
#[derive(Debug)]
pub struct CorrelationIdSequence {
    next: AtomicI64,
}

impl CorrelationIdSequence {
    /// Creates a sequence starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns the next correlation ID.
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CorrelationIdSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an invocation is sent.
#[derive(Debug, Clone)]
pub enum InvocationTarget {
    /// Any member chosen by the load balancer.
    Random,
    /// The owner of a partition.
    Partition(i32),
    /// A specific member.
    Member(Uuid),
    /// One specific connection; never moved to another connection.
    Connection(Arc<Connection>),
}

impl InvocationTarget {
    /// Returns true if the invocation may only run on one connection.
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

/// State of one logical request across its attempts.
///
/// Each attempt is sent under a fresh correlation ID; the response of an
/// earlier attempt that arrives late is dropped by its connection.
#[derive(Debug, Clone)]
pub struct Invocation {
    message: ClientMessage,
    target: InvocationTarget,
    idempotent: bool,
    attempts: u32,
    correlation_id: Option<i64>,
}

impl Invocation {
    /// Creates an invocation of the given request.
    pub fn new(message: ClientMessage, target: InvocationTarget) -> Self {
        Self {
            message,
            target,
            idempotent: true,
            attempts: 0,
            correlation_id: None,
        }
    }

    /// Marks whether the request may be repeated after a connection loss
    /// without changing its outcome.
    pub fn with_idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Returns the request message.
    pub fn message(&self) -> &ClientMessage {
        &self.message
    }

    /// Returns the invocation target.
    pub fn target(&self) -> &InvocationTarget {
        &self.target
    }

    /// Returns the number of attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Returns the correlation ID of the current attempt.
    pub fn correlation_id(&self) -> Option<i64> {
        self.correlation_id
    }

    /// Starts a new attempt, returning its correlation ID and the message to send.
    pub(crate) fn begin_attempt(&mut self, sequence: &CorrelationIdSequence) -> (i64, ClientMessage) {
        let correlation_id = sequence.next();
        self.attempts += 1;
        self.correlation_id = Some(correlation_id);
        (correlation_id, self.message.clone())
    }

    /// Returns true if the invocation may be sent again after failing with `error`.
    pub fn can_retry(&self, error: &HazelcastError, redo_operation: bool) -> bool {
        match error {
            HazelcastError::Remote(remote) => remote.is_retryable(),
            e if e.is_connection_loss() => {
                !self.target.is_bound() && (self.idempotent || redo_operation)
            }
            _ => false,
        }
    }
}

/// Cancellation token that also fires once a duration has elapsed.
///
/// The timer is stopped when the guard is dropped.
pub(crate) struct DeadlineToken {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl DeadlineToken {
    pub(crate) fn new(parent: &CancellationToken, duration: Duration) -> Self {
        let token = parent.child_token();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                token.cancel();
            })
        };
        Self { token, timer }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for DeadlineToken {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
