//! Connecting to fake members: address passes, member views, heartbeats,
//! cluster-events failover and shutdown.

mod common;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use common::*;
use hazelcast_clustering::security::AuthenticationResponse;
use hazelcast_clustering::{ClusterEvent, HazelcastError, LifecycleEvent};
use hazelcast_wire::protocol::CLIENT_ADD_CLUSTER_VIEW_LISTENER;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

async fn refused_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);
    address
}

async fn next_member_events(
    events: &mut broadcast::Receiver<ClusterEvent>,
    added: &mut HashSet<Uuid>,
    removed: &mut HashSet<Uuid>,
    until: impl Fn(&HashSet<Uuid>, &HashSet<Uuid>) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !until(&*added, &*removed) {
            match events.recv().await {
                Ok(ClusterEvent::MemberAdded(member)) => {
                    added.insert(member.id());
                }
                Ok(ClusterEvent::MemberRemoved(member)) => {
                    removed.insert(member.id());
                }
                Ok(_) => {}
                Err(e) => panic!("event channel failed: {}", e),
            }
        }
    })
    .await
    .expect("member events not received");
}

#[tokio::test]
async fn test_connect_skips_refused_address() {
    let cluster_members = FakeCluster::new();
    let member = cluster_members.start_member().await;
    let refused = refused_address().await;

    let cluster = build_cluster(
        test_config([refused, member.address()])
            .build()
            .unwrap(),
    );
    cluster.connect(&CancellationToken::new()).await.unwrap();

    assert_eq!(cluster.connection_count(), 1);
    let connection = cluster.connection(&member.id()).unwrap();
    assert_eq!(connection.address(), member.address());
    assert_eq!(cluster.members().len(), 1);
    assert_eq!(cluster.partition_count(), PARTITION_COUNT);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_cluster_reports_every_failure() {
    let first = refused_address().await;
    let second = refused_address().await;

    let cluster = build_cluster(
        test_config([first, second])
            .retry(|r| r.cluster_connect_timeout(Duration::from_millis(300)))
            .build()
            .unwrap(),
    );
    let err = cluster
        .connect(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        HazelcastError::ClusterUnreachable {
            addresses,
            failures,
        } => {
            assert!(addresses.contains(&first));
            assert!(addresses.contains(&second));
            assert!(failures.len() >= 2);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_concurrent_connects_share_one_connection() {
    let cluster_members = FakeCluster::new();
    let member = cluster_members.start_member().await;
    let cluster = build_cluster(test_config([member.address()]).build().unwrap());
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        cluster.connect_to_address(member.address(), &cancel),
        cluster.connect_to_address(member.address(), &cancel),
    );

    assert_eq!(first.unwrap().id(), second.unwrap().id());
    assert_eq!(cluster.connection_count(), 1);
    assert_eq!(member.auth_attempts(), 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_rejected_credentials_retried_once_per_attempt() {
    let cluster_members = FakeCluster::new();
    let member = cluster_members.start_member().await;
    member.set_auth_status(AuthenticationResponse::STATUS_CREDENTIALS_FAILED);

    let cluster = build_cluster(test_config([member.address()]).build().unwrap());
    let err = cluster
        .connect_to_address(member.address(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, HazelcastError::Authentication(_)));
    assert_eq!(member.auth_attempts(), 2);
    assert_eq!(cluster.connection_count(), 0);
}

#[tokio::test]
async fn test_smart_routing_connects_to_every_member() {
    let cluster_members = FakeCluster::new();
    let a = cluster_members.start_member().await;
    let b = cluster_members.start_member().await;

    let cluster = build_cluster(test_config([a.address()]).build().unwrap());
    cluster.connect(&CancellationToken::new()).await.unwrap();

    wait_until(|| cluster.connection_count() == 2).await;
    assert!(cluster.connection(&b.id()).is_some());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_unisocket_client_keeps_one_connection() {
    let cluster_members = FakeCluster::new();
    let a = cluster_members.start_member().await;
    let _b = cluster_members.start_member().await;

    let cluster = build_cluster(
        test_config([a.address()])
            .smart_routing(false)
            .build()
            .unwrap(),
    );
    cluster.connect(&CancellationToken::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(cluster.connection_count(), 1);
    assert_eq!(cluster.members().len(), 2);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_member_view_reconciles_connections() {
    let cluster_members = FakeCluster::new();
    let a = cluster_members.start_member().await;
    let b = cluster_members.start_member().await;

    let cluster = build_cluster(test_config([a.address()]).build().unwrap());
    cluster.connect(&CancellationToken::new()).await.unwrap();
    wait_until(|| cluster.connection_count() == 2).await;

    let mut events = cluster.subscribe_events();
    let c = cluster_members.start_member().await;
    cluster_members.remove_member(a.id());
    cluster_members.publish_members();

    let (mut added, mut removed) = (HashSet::new(), HashSet::new());
    let c_id = c.id();
    let a_id = a.id();
    next_member_events(&mut events, &mut added, &mut removed, |added, removed| {
        added.contains(&c_id) && removed.contains(&a_id)
    })
    .await;

    assert!(!added.contains(&b.id()));
    assert!(!removed.contains(&b.id()));

    wait_until(|| cluster.connection(&c.id()).is_some() && cluster.connection(&a.id()).is_none())
        .await;
    let ids: HashSet<_> = cluster.members().iter().map(|m| m.id()).collect();
    assert_eq!(ids, HashSet::from([b.id(), c.id()]));

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_cluster_events_connection_fails_over() {
    let cluster_members = FakeCluster::new();
    let a = cluster_members.start_member().await;
    let b = cluster_members.start_member().await;

    let cluster = build_cluster(test_config([a.address()]).build().unwrap());
    cluster.connect(&CancellationToken::new()).await.unwrap();
    wait_until(|| cluster.connection_count() == 2).await;

    let events_connection = cluster.cluster_events_connection().unwrap();
    assert_eq!(events_connection.member_id(), Some(a.id()));

    a.kill();

    wait_until(|| {
        cluster
            .cluster_events_connection()
            .is_some_and(|connection| connection.member_id() == Some(b.id()))
    })
    .await;
    wait_until(|| b.view_listener_count() == 1).await;
    assert_eq!(cluster.connection_count(), 1);

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_cluster_events_election_resumes_after_giving_up() {
    let cluster_members = FakeCluster::new();
    let a = cluster_members.start_member().await;
    let b = cluster_members.start_member().await;
    let c = cluster_members.start_member().await;

    let cluster = build_cluster(test_config([a.address()]).build().unwrap());
    cluster.connect(&CancellationToken::new()).await.unwrap();
    wait_until(|| cluster.connection_count() == 3).await;
    assert_eq!(
        cluster.cluster_events_connection().unwrap().member_id(),
        Some(a.id())
    );

    b.set_reject_view_listeners(true);
    c.set_reject_view_listeners(true);
    a.kill();

    let attempts = || {
        b.received(CLIENT_ADD_CLUSTER_VIEW_LISTENER).len()
            + c.received(CLIENT_ADD_CLUSTER_VIEW_LISTENER).len()
    };
    wait_until(|| attempts() == 6 && cluster.cluster_events_connection().is_none()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(attempts(), 6);
    assert!(cluster.cluster_events_connection().is_none());

    b.set_reject_view_listeners(false);
    c.kill();

    wait_until(|| {
        cluster
            .cluster_events_connection()
            .is_some_and(|connection| connection.member_id() == Some(b.id()))
    })
    .await;
    wait_until(|| b.view_listener_count() == 1).await;

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_silent_member_closed_by_heartbeat() {
    let cluster_members = FakeCluster::new();
    let member = cluster_members.start_member().await;

    let cluster = build_cluster(
        test_config([member.address()])
            .heartbeat(|h| {
                h.period(Duration::from_millis(50))
                    .timeout(Duration::from_millis(300))
                    .ping_timeout(Duration::from_millis(100))
            })
            .build()
            .unwrap(),
    );
    let mut lifecycle = cluster.subscribe_lifecycle();
    cluster.connect(&CancellationToken::new()).await.unwrap();

    member.set_silent(true);
    wait_until(|| cluster.connection_count() == 0).await;

    let disconnected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(LifecycleEvent::ClientDisconnected) = lifecycle.recv().await {
                return;
            }
        }
    })
    .await;
    assert!(disconnected.is_ok());

    cluster.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let cluster_members = FakeCluster::new();
    let member = cluster_members.start_member().await;

    let cluster = build_cluster(test_config([member.address()]).build().unwrap());
    let mut lifecycle = cluster.subscribe_lifecycle();
    cluster.connect(&CancellationToken::new()).await.unwrap();
    wait_until(|| cluster.partition_owner(0).is_some()).await;

    tokio::join!(cluster.shutdown(), cluster.shutdown());
    cluster.shutdown().await;

    let mut seen = Vec::new();
    while let Ok(event) = lifecycle.try_recv() {
        seen.push(event);
    }
    let count = |wanted: LifecycleEvent| seen.iter().filter(|e| **e == wanted).count();
    assert_eq!(count(LifecycleEvent::Starting), 1);
    assert_eq!(count(LifecycleEvent::Started), 1);
    assert_eq!(count(LifecycleEvent::ShuttingDown), 1);
    assert_eq!(count(LifecycleEvent::Shutdown), 1);

    assert!(cluster.is_shutdown());
    assert_eq!(cluster.connection_count(), 0);
    assert_eq!(cluster.partition_owner(0), None);
    let err = cluster
        .send_to_random(echo_request(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HazelcastError::ClientNotActive(_)));
    assert!(cluster.connect(&CancellationToken::new()).await.is_err());
}
