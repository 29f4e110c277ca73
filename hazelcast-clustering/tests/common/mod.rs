//! In-process cluster members speaking the client protocol, and the test
//! codecs the client uses to talk to them.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use hazelcast_clustering::cluster::{ClusterViewCodec, ClusterViewEvent, MemberInfo};
use hazelcast_clustering::config::{ClientConfig, ClientConfigBuilder};
use hazelcast_clustering::security::{
    AuthenticationCodec, AuthenticationContext, AuthenticationResponse, AuthenticationResult,
    Credentials,
};
use hazelcast_clustering::{Cluster, ClusterSubscription, Connection};
use hazelcast_wire::protocol::{
    encode_error, ClientMessage, ClientMessageCodec, ErrorCode, Frame, CLIENT_ADD_CLUSTER_VIEW_LISTENER,
    CLIENT_ADD_CLUSTER_VIEW_LISTENER_RESPONSE, CLIENT_AUTHENTICATION,
    CLIENT_AUTHENTICATION_RESPONSE, CLIENT_MEMBERS_VIEW_EVENT, CLIENT_PARTITIONS_VIEW_EVENT,
    CLIENT_PING, CLIENT_PING_RESPONSE, PARTITION_ID_ANY,
};
use hazelcast_wire::{HazelcastError, RemoteError, Result};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use uuid::Uuid;

pub const TEST_ECHO: i32 = 0x7F0100;
pub const TEST_ECHO_RESPONSE: i32 = 0x7F0101;
pub const TEST_SUBSCRIBE: i32 = 0x7F0200;
pub const TEST_SUBSCRIBE_RESPONSE: i32 = 0x7F0201;
pub const TEST_EVENT: i32 = 0x7F0202;
pub const TEST_UNSUBSCRIBE: i32 = 0x7F0300;
pub const TEST_UNSUBSCRIBE_RESPONSE: i32 = 0x7F0301;

pub const PARTITION_COUNT: usize = 8;

/// A request seen by a fake member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    pub message_type: i32,
    pub correlation_id: i64,
    pub partition_id: i32,
}

type Outbox = mpsc::UnboundedSender<ClientMessage>;

/// Shared topology of a set of fake members.
#[derive(Clone, Default)]
pub struct FakeCluster {
    shared: Arc<ClusterShared>,
}

#[derive(Default)]
struct ClusterShared {
    members: Mutex<Vec<Arc<MemberShared>>>,
    started: Mutex<Vec<Arc<MemberShared>>>,
    member_version: AtomicI32,
    partition_version: AtomicI32,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a member listening on an ephemeral port and adds it to the
    /// member list without publishing the change.
    pub async fn start_member(&self) -> FakeMember {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shared = Arc::new(MemberShared {
            id: Uuid::new_v4(),
            address,
            cluster: Arc::downgrade(&self.shared),
            silent: AtomicBool::new(false),
            reject_view_listeners: AtomicBool::new(false),
            fail_next: AtomicU32::new(0),
            auth_status: AtomicU8::new(AuthenticationResponse::STATUS_AUTHENTICATED),
            auth_attempts: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            view_listeners: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            unsubscribes: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        });
        self.shared.members.lock().push(Arc::clone(&shared));
        self.shared.started.lock().push(Arc::clone(&shared));
        self.shared.member_version.fetch_add(1, Ordering::SeqCst);

        let acceptor = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let handler = tokio::spawn(serve(Arc::clone(&shared), stream));
                    shared.connections.lock().push(handler);
                }
            })
        };

        FakeMember { shared, acceptor }
    }

    /// Removes a member from the member list without publishing the change.
    pub fn remove_member(&self, id: Uuid) {
        self.shared.members.lock().retain(|member| member.id != id);
        self.shared.member_version.fetch_add(1, Ordering::SeqCst);
    }

    /// Pushes the current member view to every cluster view listener,
    /// including listeners on members that already left.
    pub fn publish_members(&self) {
        let started = self.shared.started.lock().clone();
        for member in started {
            member.push_views(&self.shared, true, false);
        }
    }

    /// Reassigns partitions round-robin and pushes the partition view to
    /// every cluster view listener.
    pub fn publish_partitions(&self) {
        self.shared.partition_version.fetch_add(1, Ordering::SeqCst);
        let started = self.shared.started.lock().clone();
        for member in started {
            member.push_views(&self.shared, false, true);
        }
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.shared.members.lock().iter().map(|m| m.id).collect()
    }
}

impl ClusterShared {
    fn members_event(&self, correlation_id: i64) -> ClientMessage {
        let mut event =
            ClientMessage::create_event(CLIENT_MEMBERS_VIEW_EVENT, correlation_id, PARTITION_ID_ANY);
        event.add_frame(i32_frame(self.member_version.load(Ordering::SeqCst)));
        for member in self.members.lock().iter() {
            let mut content = BytesMut::new();
            content.put_slice(member.id.as_bytes());
            content.put_slice(member.address.to_string().as_bytes());
            event.add_frame(Frame::with_content(content));
        }
        event
    }

    fn partitions_event(&self, correlation_id: i64) -> ClientMessage {
        let mut event = ClientMessage::create_event(
            CLIENT_PARTITIONS_VIEW_EVENT,
            correlation_id,
            PARTITION_ID_ANY,
        );
        event.add_frame(i32_frame(self.partition_version.load(Ordering::SeqCst)));

        let members = self.members.lock();
        for (index, member) in members.iter().enumerate() {
            let mut content = BytesMut::new();
            content.put_slice(member.id.as_bytes());
            for partition in (0..PARTITION_COUNT).filter(|p| p % members.len() == index) {
                content.put_i32_le(partition as i32);
            }
            event.add_frame(Frame::with_content(content));
        }
        event
    }
}

/// One fake member. Dropping it stops accepting and closes its connections.
pub struct FakeMember {
    shared: Arc<MemberShared>,
    acceptor: JoinHandle<()>,
}

struct MemberShared {
    id: Uuid,
    address: SocketAddr,
    cluster: Weak<ClusterShared>,
    silent: AtomicBool,
    reject_view_listeners: AtomicBool,
    fail_next: AtomicU32,
    auth_status: AtomicU8,
    auth_attempts: AtomicUsize,
    requests: Mutex<Vec<Received>>,
    view_listeners: Mutex<Vec<(i64, Outbox)>>,
    subscriptions: Mutex<Vec<(i64, Outbox)>>,
    unsubscribes: AtomicUsize,
    connections: Mutex<Vec<JoinHandle<()>>>,
}

impl FakeMember {
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn address(&self) -> SocketAddr {
        self.shared.address
    }

    /// Stops answering every request, including pings.
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::SeqCst);
    }

    /// Answers cluster view listener requests with a non-retryable error.
    pub fn set_reject_view_listeners(&self, reject: bool) {
        self.shared.reject_view_listeners.store(reject, Ordering::SeqCst);
    }

    /// Answers the next `count` echo requests with a retryable error.
    pub fn fail_next_echoes(&self, count: u32) {
        self.shared.fail_next.store(count, Ordering::SeqCst);
    }

    /// Sets the status returned to the next authentication requests.
    pub fn set_auth_status(&self, status: u8) {
        self.shared.auth_status.store(status, Ordering::SeqCst);
    }

    pub fn auth_attempts(&self) -> usize {
        self.shared.auth_attempts.load(Ordering::SeqCst)
    }

    pub fn received(&self, message_type: i32) -> Vec<Received> {
        self.shared
            .requests
            .lock()
            .iter()
            .filter(|r| r.message_type == message_type)
            .copied()
            .collect()
    }

    pub fn view_listener_count(&self) -> usize {
        self.shared.view_listeners.lock().len()
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.lock().len()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.shared.unsubscribes.load(Ordering::SeqCst)
    }

    /// Pushes a test event to every subscription installed on this member.
    pub fn push_event(&self) {
        for (correlation_id, outbox) in self.shared.subscriptions.lock().iter() {
            let _ = outbox.send(ClientMessage::create_event(
                TEST_EVENT,
                *correlation_id,
                PARTITION_ID_ANY,
            ));
        }
    }

    /// Sends a response for a correlation id nobody is waiting on.
    pub fn push_orphan_response(&self, correlation_id: i64) {
        for (_, outbox) in self.shared.view_listeners.lock().iter() {
            let _ = outbox.send(ClientMessage::create_response(TEST_ECHO_RESPONSE, correlation_id));
        }
    }

    /// Closes every client connection and stops accepting new ones.
    pub fn kill(&self) {
        self.acceptor.abort();
        for connection in self.shared.connections.lock().drain(..) {
            connection.abort();
        }
        self.shared.view_listeners.lock().clear();
        self.shared.subscriptions.lock().clear();
    }
}

impl Drop for FakeMember {
    fn drop(&mut self) {
        self.kill();
    }
}

impl MemberShared {
    fn push_views(&self, cluster: &ClusterShared, members: bool, partitions: bool) {
        for (correlation_id, outbox) in self.view_listeners.lock().iter() {
            if members {
                let _ = outbox.send(cluster.members_event(*correlation_id));
            }
            if partitions {
                let _ = outbox.send(cluster.partitions_event(*correlation_id));
            }
        }
    }

    fn respond(&self, request: &ClientMessage, outbox: &Outbox) -> Option<ClientMessage> {
        let message_type = request.message_type()?;
        let correlation_id = request.correlation_id()?;
        self.requests.lock().push(Received {
            message_type,
            correlation_id,
            partition_id: request.partition_id().unwrap_or(PARTITION_ID_ANY),
        });

        if self.silent.load(Ordering::SeqCst) {
            return None;
        }

        match message_type {
            CLIENT_AUTHENTICATION => {
                self.auth_attempts.fetch_add(1, Ordering::SeqCst);
                let mut response =
                    ClientMessage::create_response(CLIENT_AUTHENTICATION_RESPONSE, correlation_id);
                let mut status = BytesMut::new();
                status.put_u8(self.auth_status.load(Ordering::SeqCst));
                response.add_frame(Frame::with_content(status));
                response.add_frame(Frame::with_content(BytesMut::from(&self.id.as_bytes()[..])));
                response.add_frame(i32_frame(PARTITION_COUNT as i32));
                response.add_frame(Frame::new_string_frame(&self.address.to_string()));
                Some(response)
            }
            CLIENT_PING => Some(ClientMessage::create_response(CLIENT_PING_RESPONSE, correlation_id)),
            CLIENT_ADD_CLUSTER_VIEW_LISTENER
                if self.reject_view_listeners.load(Ordering::SeqCst) =>
            {
                let error = RemoteError::new(
                    ErrorCode::IllegalState,
                    "IllegalStateException",
                    Some("view listener rejected".to_string()),
                );
                Some(encode_error(correlation_id, &error))
            }
            CLIENT_ADD_CLUSTER_VIEW_LISTENER => {
                self.view_listeners
                    .lock()
                    .push((correlation_id, outbox.clone()));
                let _ = outbox.send(ClientMessage::create_response(
                    CLIENT_ADD_CLUSTER_VIEW_LISTENER_RESPONSE,
                    correlation_id,
                ));
                if let Some(cluster) = self.cluster.upgrade() {
                    let _ = outbox.send(cluster.members_event(correlation_id));
                    let _ = outbox.send(cluster.partitions_event(correlation_id));
                }
                None
            }
            TEST_ECHO => {
                let remaining = self.fail_next.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.fail_next.store(remaining - 1, Ordering::SeqCst);
                    let error = RemoteError::new(
                        ErrorCode::WrongTarget,
                        "WrongTargetException",
                        Some("not the owner".to_string()),
                    );
                    return Some(encode_error(correlation_id, &error));
                }
                Some(ClientMessage::create_response(TEST_ECHO_RESPONSE, correlation_id))
            }
            TEST_SUBSCRIBE => {
                self.subscriptions
                    .lock()
                    .push((correlation_id, outbox.clone()));
                let mut response =
                    ClientMessage::create_response(TEST_SUBSCRIBE_RESPONSE, correlation_id);
                response.add_frame(Frame::with_content(BytesMut::from(
                    &Uuid::new_v4().as_bytes()[..],
                )));
                Some(response)
            }
            TEST_UNSUBSCRIBE => {
                self.unsubscribes.fetch_add(1, Ordering::SeqCst);
                let mut response =
                    ClientMessage::create_response(TEST_UNSUBSCRIBE_RESPONSE, correlation_id);
                let mut removed = BytesMut::new();
                removed.put_u8(1);
                response.add_frame(Frame::with_content(removed));
                Some(response)
            }
            _ => None,
        }
    }
}

async fn serve(member: Arc<MemberShared>, mut stream: TcpStream) {
    let mut preamble = [0u8; 3];
    if stream.read_exact(&mut preamble).await.is_err() || &preamble != b"CP2" {
        return;
    }

    let mut framed = Framed::new(stream, ClientMessageCodec::new());
    let (outbox, mut inbox) = mpsc::unbounded_channel();

    loop {
        tokio::select! {
            request = framed.next() => match request {
                Some(Ok(request)) => {
                    if let Some(response) = member.respond(&request, &outbox) {
                        if framed.send(response).await.is_err() {
                            return;
                        }
                    }
                }
                _ => return,
            },
            Some(message) = inbox.recv() => {
                if framed.send(message).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn i32_frame(value: i32) -> Frame {
    let mut content = BytesMut::new();
    content.put_i32_le(value);
    Frame::with_content(content)
}

fn read_uuid(content: &[u8]) -> Result<Uuid> {
    content
        .get(..16)
        .and_then(|bytes| Uuid::from_slice(bytes).ok())
        .ok_or_else(|| HazelcastError::Serialization("truncated uuid".into()))
}

fn read_i32(content: &[u8]) -> Result<i32> {
    content
        .get(..4)
        .map(|mut bytes| bytes.get_i32_le())
        .ok_or_else(|| HazelcastError::Serialization("truncated int".into()))
}

fn frame(message: &ClientMessage, index: usize) -> Result<&[u8]> {
    message
        .frames()
        .get(index)
        .map(|frame| &frame.content[..])
        .ok_or_else(|| HazelcastError::Serialization(format!("missing frame {}", index)))
}

/// Authentication codec matching the fake members.
pub struct TestAuthCodec;

impl AuthenticationCodec for TestAuthCodec {
    fn encode_request(
        &self,
        _context: &AuthenticationContext,
        _credentials: &Credentials,
    ) -> ClientMessage {
        ClientMessage::create_for_encode_any_partition(CLIENT_AUTHENTICATION)
    }

    fn decode_response(&self, response: &ClientMessage) -> Result<AuthenticationResponse> {
        let status = frame(response, 1)?
            .first()
            .copied()
            .ok_or_else(|| HazelcastError::Serialization("missing status".into()))?;
        if status != AuthenticationResponse::STATUS_AUTHENTICATED {
            return Ok(AuthenticationResponse::new_failed(status));
        }

        let member_id = read_uuid(frame(response, 2)?)?;
        let partition_count = read_i32(frame(response, 3)?)? as usize;
        let member_address = std::str::from_utf8(frame(response, 4)?)
            .ok()
            .and_then(|address| address.parse().ok())
            .ok_or_else(|| HazelcastError::Serialization("bad member address".into()))?;

        Ok(AuthenticationResponse::new_authenticated(AuthenticationResult {
            cluster_id: Uuid::nil(),
            member_id,
            member_address,
            server_version: "5.4.0".into(),
            failover_supported: false,
            partition_count,
            serialization_version: 1,
        }))
    }
}

/// Cluster view codec matching the fake members.
pub struct TestViewCodec;

impl ClusterViewCodec for TestViewCodec {
    fn encode_add_listener_request(&self) -> ClientMessage {
        ClientMessage::create_for_encode_any_partition(CLIENT_ADD_CLUSTER_VIEW_LISTENER)
    }

    fn decode_event(&self, event: &ClientMessage) -> Result<ClusterViewEvent> {
        let version = read_i32(frame(event, 1)?)?;
        let entries = event.frames().iter().skip(2).map(|frame| &frame.content[..]);

        match event.message_type() {
            Some(CLIENT_MEMBERS_VIEW_EVENT) => {
                let mut members = Vec::new();
                for entry in entries {
                    let id = read_uuid(entry)?;
                    let address = std::str::from_utf8(&entry[16..])
                        .ok()
                        .and_then(|address| address.parse().ok())
                        .ok_or_else(|| HazelcastError::Serialization("bad address".into()))?;
                    members.push(MemberInfo::new(id, address));
                }
                Ok(ClusterViewEvent::Members { version, members })
            }
            Some(CLIENT_PARTITIONS_VIEW_EVENT) => {
                let mut partitions = Vec::new();
                for entry in entries {
                    let owner = read_uuid(entry)?;
                    let ids = entry[16..]
                        .chunks_exact(4)
                        .map(|mut chunk| chunk.get_i32_le())
                        .collect();
                    partitions.push((owner, ids));
                }
                Ok(ClusterViewEvent::Partitions {
                    version,
                    partitions,
                })
            }
            other => Err(HazelcastError::Protocol(format!(
                "unexpected cluster view event {:?}",
                other
            ))),
        }
    }
}

/// A client configuration with timeouts short enough for tests.
pub fn test_config(addresses: impl IntoIterator<Item = SocketAddr>) -> ClientConfigBuilder {
    ClientConfigBuilder::new()
        .cluster_name("dev")
        .addresses(addresses)
        .connection_timeout(Duration::from_secs(2))
        .retry(|r| {
            r.initial_backoff(Duration::from_millis(20))
                .max_backoff(Duration::from_millis(100))
                .multiplier(2.0)
                .cluster_connect_timeout(Duration::from_secs(2))
        })
        .invocation(|i| {
            i.invocation_timeout(Duration::from_secs(5))
                .max_retry_delay(Duration::from_millis(50))
        })
}

pub fn build_cluster(config: ClientConfig) -> Cluster {
    Cluster::builder(config)
        .authentication_codec(TestAuthCodec)
        .cluster_view_codec(TestViewCodec)
        .build()
        .unwrap()
}

pub fn echo_request() -> ClientMessage {
    ClientMessage::create_for_encode_any_partition(TEST_ECHO)
}

/// A subscription to the fake members' test events that counts deliveries.
pub fn counting_subscription(counter: Arc<AtomicUsize>) -> Arc<ClusterSubscription> {
    let subscription =
        ClusterSubscription::builder(ClientMessage::create_for_encode_any_partition(TEST_SUBSCRIBE))
            .decode_subscribe_response(|response: &ClientMessage| read_uuid(frame(response, 1)?))
            .unsubscribe_request(|server_id: Uuid| {
                let mut request = ClientMessage::create_for_encode_any_partition(TEST_UNSUBSCRIBE);
                request.add_frame(Frame::with_content(BytesMut::from(&server_id.as_bytes()[..])));
                request
            })
            .decode_unsubscribe_response(|response: &ClientMessage| {
                Ok(frame(response, 1)?.first() == Some(&1))
            })
            .handler(move |_: &ClientMessage, _: &Connection| -> Result<()> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .build()
            .unwrap();
    Arc::new(subscription)
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
