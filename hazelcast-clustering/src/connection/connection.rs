//! Single connection to a Hazelcast cluster member.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use hazelcast_wire::protocol::{
    decode_error, ClientMessage, ClientMessageCodec, CLIENT_PROTOCOL_PREAMBLE,
};
use hazelcast_wire::{HazelcastError, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::{timeout, Instant};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::invocation::CorrelationIdSequence;

/// Upper bound on flushing and closing the write half during shutdown.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type MessageWriter = FramedWrite<BoxedWriter, ClientMessageCodec>;
type MessageReader = FramedRead<BoxedReader, ClientMessageCodec>;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives what a connection cannot handle on its own: server-pushed
/// events and the notice that the connection has died.
///
/// Both callbacks run on the connection's receive task and must not block.
pub trait ConnectionObserver: Send + Sync {
    /// Called for every inbound event message, in the order received.
    fn on_event(&self, connection: &Connection, event: ClientMessage);

    /// Called exactly once, after the connection has been shut down and
    /// every pending invocation has been failed.
    fn on_closed(&self, connection: &Connection, reason: &str);
}

/// A connection to a single Hazelcast cluster member.
///
/// Owns the transport, assigns correlation IDs to outbound requests and
/// matches responses to the invocations waiting for them. Inbound messages
/// are read by a dedicated task, so messages from one connection are always
/// handled in the order they arrive.
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    member_id: OnceLock<Uuid>,
    writer: AsyncMutex<Option<MessageWriter>>,
    pending: DashMap<i64, oneshot::Sender<Result<ClientMessage>>>,
    active: Mutex<bool>,
    closed: CancellationToken,
    sequence: Arc<CorrelationIdSequence>,
    observer: Arc<dyn ConnectionObserver>,
    created_at: Instant,
    last_read_millis: AtomicU64,
    last_write_millis: AtomicU64,
}

impl Connection {
    /// Opens a TCP connection to the given address and starts its receive loop.
    pub async fn connect(
        address: SocketAddr,
        connect_timeout: Duration,
        sequence: Arc<CorrelationIdSequence>,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Arc<Self>> {
        let stream = timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                HazelcastError::Timeout(format!(
                    "connection to {} timed out after {:?}",
                    address, connect_timeout
                ))
            })?
            .map_err(|e| {
                HazelcastError::Connection(format!("failed to connect to {}: {}", address, e))
            })?;

        stream.set_nodelay(true).map_err(|e| {
            HazelcastError::Connection(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        Self::establish(stream, address, sequence, observer).await
    }

    /// Starts a connection over an already established stream.
    ///
    /// Writes the protocol preamble before any message and spawns the
    /// receive loop.
    pub async fn establish<S>(
        stream: S,
        address: SocketAddr,
        sequence: Arc<CorrelationIdSequence>,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<Arc<Self>>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        writer
            .write_all(&CLIENT_PROTOCOL_PREAMBLE)
            .await
            .map_err(|e| {
                HazelcastError::Connection(format!(
                    "failed to write protocol preamble to {}: {}",
                    address, e
                ))
            })?;

        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            address,
            member_id: OnceLock::new(),
            writer: AsyncMutex::new(Some(FramedWrite::new(writer, ClientMessageCodec::new()))),
            pending: DashMap::new(),
            active: Mutex::new(true),
            closed: CancellationToken::new(),
            sequence,
            observer,
            created_at: Instant::now(),
            last_read_millis: AtomicU64::new(0),
            last_write_millis: AtomicU64::new(0),
        });

        let reader = FramedRead::new(reader, ClientMessageCodec::new());
        tokio::spawn(Arc::clone(&connection).receive_loop(reader));

        tracing::debug!(id = %connection.id, address = %address, "established connection");
        Ok(connection)
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address of this connection.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the member this connection authenticated against, if any.
    pub fn member_id(&self) -> Option<Uuid> {
        self.member_id.get().copied()
    }

    pub(crate) fn set_member_id(&self, member_id: Uuid) {
        if self.member_id.set(member_id).is_err() {
            tracing::warn!(id = %self.id, "member id already assigned");
        }
    }

    /// Returns true until the connection has been shut down.
    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when a message was last read from this connection.
    pub fn last_read_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_read_millis.load(Ordering::Relaxed))
    }

    /// Returns when a message was last written to this connection.
    pub fn last_write_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_write_millis.load(Ordering::Relaxed))
    }

    /// Returns the number of invocations waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends a request and waits for its response.
    ///
    /// The request gets the next correlation ID of the shared sequence. A
    /// server error response is returned as [`HazelcastError::Remote`].
    pub async fn send(
        &self,
        message: ClientMessage,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        let correlation_id = self.sequence.next();
        self.send_correlated(message, correlation_id, cancel).await
    }

    /// Sends a request under a correlation ID allocated by the caller.
    ///
    /// Used by callers that must register the ID elsewhere before the request
    /// reaches the wire.
    pub async fn send_correlated(
        &self,
        mut message: ClientMessage,
        correlation_id: i64,
        cancel: &CancellationToken,
    ) -> Result<ClientMessage> {
        if cancel.is_cancelled() {
            return Err(HazelcastError::Cancelled(format!(
                "invocation {} cancelled before sending",
                correlation_id
            )));
        }

        message.set_correlation_id(correlation_id);
        message.mark_unfragmented();

        let receiver = self.register(correlation_id)?;
        if let Err(e) = self.write(message, correlation_id, cancel).await {
            self.pending.remove(&correlation_id);
            return Err(e);
        }

        tokio::select! {
            result = receiver => result.unwrap_or_else(|_| Err(self.closed_error())),
            _ = cancel.cancelled() => {
                self.pending.remove(&correlation_id);
                Err(HazelcastError::Cancelled(format!(
                    "invocation {} on {} cancelled",
                    correlation_id, self.id
                )))
            }
        }
    }

    fn register(&self, correlation_id: i64) -> Result<oneshot::Receiver<Result<ClientMessage>>> {
        let active = self.active.lock();
        if !*active {
            return Err(HazelcastError::ClientNotActive(format!(
                "connection {} to {} is not active",
                self.id, self.address
            )));
        }

        let (sender, receiver) = oneshot::channel();
        self.pending.insert(correlation_id, sender);
        Ok(receiver)
    }

    /// Writes one message.
    ///
    /// Waiting for the writer can be cancelled freely. Once the message is
    /// being written, an interrupted or failed write leaves a partial frame
    /// on the stream, so the connection is shut down.
    async fn write(
        &self,
        message: ClientMessage,
        correlation_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut writer = tokio::select! {
            writer = self.writer.lock() => writer,
            _ = cancel.cancelled() => {
                return Err(HazelcastError::Cancelled(format!(
                    "invocation {} cancelled while waiting to write on {}",
                    correlation_id, self.id
                )));
            }
            _ = self.closed.cancelled() => return Err(self.closing_error()),
        };
        let Some(framed) = writer.as_mut() else {
            return Err(self.closing_error());
        };

        let sent = tokio::select! {
            sent = framed.send(message) => sent,
            _ = cancel.cancelled() => Err(HazelcastError::Cancelled(format!(
                "invocation {} cancelled while writing on {}",
                correlation_id, self.id
            ))),
            _ = self.closed.cancelled() => Err(self.closed_error()),
        };
        drop(writer);

        match sent {
            Ok(()) => {
                self.touch(&self.last_write_millis);
                Ok(())
            }
            Err(e) => {
                self.shutdown(&format!("write failed: {}", e)).await;
                Err(e)
            }
        }
    }

    fn closing_error(&self) -> HazelcastError {
        HazelcastError::ClientNotActive(format!(
            "connection {} to {} is closing",
            self.id, self.address
        ))
    }

    async fn receive_loop(self: Arc<Self>, mut reader: MessageReader) {
        let reason = loop {
            let next = tokio::select! {
                _ = self.closed.cancelled() => return,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    self.touch(&self.last_read_millis);
                    self.handle_message(message);
                }
                Some(Err(e)) => break format!("read failed: {}", e),
                None => break "connection closed by the member".to_string(),
            }
        };

        self.shutdown(&reason).await;
    }

    fn handle_message(&self, message: ClientMessage) {
        if message.is_backup_event() {
            tracing::trace!(id = %self.id, "dropping backup event");
            return;
        }

        if message.is_event() {
            self.observer.on_event(self, message);
            return;
        }

        let Some(correlation_id) = message.correlation_id() else {
            tracing::warn!(id = %self.id, "dropping response without a correlation id");
            return;
        };

        let Some((_, sender)) = self.pending.remove(&correlation_id) else {
            tracing::debug!(
                id = %self.id,
                correlation_id = correlation_id,
                "dropping orphan response"
            );
            return;
        };

        let result = if message.is_exception() {
            decode_error(&message).and_then(|remote| Err(remote.into()))
        } else {
            Ok(message)
        };
        let _ = sender.send(result);
    }

    /// Shuts the connection down.
    ///
    /// Idempotent: only the first call fails pending invocations, closes the
    /// transport and notifies the observer.
    pub async fn shutdown(&self, reason: &str) {
        {
            let mut active = self.active.lock();
            if !*active {
                return;
            }
            *active = false;
        }

        self.closed.cancel();

        let correlation_ids: Vec<i64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for correlation_id in correlation_ids {
            if let Some((_, sender)) = self.pending.remove(&correlation_id) {
                let _ = sender.send(Err(self.closed_error()));
            }
        }

        let close_writer = async {
            if let Some(mut writer) = self.writer.lock().await.take() {
                let _ = writer.close().await;
            }
        };
        if timeout(WRITER_CLOSE_TIMEOUT, close_writer).await.is_err() {
            tracing::debug!(id = %self.id, "timed out closing the write half");
        }

        tracing::info!(id = %self.id, address = %self.address, reason = reason, "connection closed");
        self.observer.on_closed(self, reason);
    }

    fn closed_error(&self) -> HazelcastError {
        HazelcastError::ConnectionClosed(format!(
            "connection {} to {} closed",
            self.id, self.address
        ))
    }

    fn touch(&self, slot: &AtomicU64) {
        slot.store(self.created_at.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("member_id", &self.member_id())
            .field("active", &self.is_active())
            .field("pending", &self.pending.len())
            .finish()
    }
}
