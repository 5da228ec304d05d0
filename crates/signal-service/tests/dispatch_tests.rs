//! Integration tests for action dispatch.
//!
//! Covers routing by action name, payload errors, the room-switch policy,
//! and cleanup on disconnect.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::types::{PeerId, RoomId};
use serde_json::{json, Value};
use signal_service::discovery::Capability;
use signal_service::errors::SignalError;
use signal_service::rpc::RpcError;
use signal_test_utils::{DirectoryCall, MockDirectory, MockRelay, TestCluster, TestPeer};

fn offer_payload() -> Value {
    json!({ "jsep": { "type": "offer", "sdp": "v=0 offer" } })
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unknown_action_is_rejected() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "teleport", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::UnknownAction(_)));
    assert_eq!(err.error_code(), 405);
    assert!(cluster.directory.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": 42 }))
        .await
        .unwrap_err();
    assert!(matches!(err, SignalError::InvalidPayload(_)));
    assert_eq!(err.error_code(), 400);

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "subscribe", json!("not an object"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 400);
    assert_eq!(cluster.registry.peer_count().await, 0);
}

#[tokio::test]
async fn test_missing_fields_reach_validation() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "join", Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 4);

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "subscribe", json!({ "jsep": { "sdp": "x" } }))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 8);

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "subscribe", json!({ "mid": "m1" }))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 6);
}

#[tokio::test]
async fn test_publish_and_subscribe_results_are_serialized() {
    let cluster = TestCluster::builder()
        .relay(MockRelay::new("sfu-1").with_publish_mid("m1"))
        .build();
    let alice = TestPeer::new("alice");
    let bob = TestPeer::new("bob");

    let joined = cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
        .await
        .unwrap();
    assert_eq!(joined, json!({}));

    let published = cluster
        .dispatcher
        .handle(&alice.peer, "publish", offer_payload())
        .await
        .unwrap();
    assert_eq!(published["mid"], "m1");
    assert_eq!(published["jsep"]["type"], "answer");

    let subscribed = cluster
        .dispatcher
        .handle(
            &bob.peer,
            "subscribe",
            json!({ "mid": "m1", "jsep": { "type": "offer", "sdp": "v=0 sub" } }),
        )
        .await
        .unwrap();
    assert_eq!(subscribed["mid"], "m1");
    assert_eq!(subscribed["jsep"]["type"], "answer");

    let unsubscribed = cluster
        .dispatcher
        .handle(&bob.peer, "unsubscribe", json!({ "mid": "m1" }))
        .await
        .unwrap();
    assert_eq!(unsubscribed, json!({ "mid": "m1" }));
}

#[tokio::test]
async fn test_broadcast_goes_to_directory() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let result = cluster
        .dispatcher
        .handle(
            &alice.peer,
            "broadcast",
            json!({ "rid": "room-1", "uid": "alice", "info": { "text": "hi" } }),
        )
        .await
        .unwrap();
    assert_eq!(result, json!({}));

    cluster
        .directory
        .wait_for(1, |call| {
            call == &DirectoryCall::Broadcast {
                rid: RoomId::from("room-1"),
                uid: PeerId::from("alice"),
                info: json!({ "text": "hi" }),
            }
        })
        .await;
}

#[tokio::test]
async fn test_broadcast_requires_room_and_sender() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let err = cluster
        .dispatcher
        .handle(&alice.peer, "broadcast", json!({ "rid": "room-1" }))
        .await
        .unwrap_err();

    assert!(matches!(err, SignalError::Room));
    assert!(cluster.directory.calls().is_empty());
}

#[tokio::test]
async fn test_broadcast_without_directory_is_service_unavailable() {
    let cluster = TestCluster::builder()
        .relay(MockRelay::new("sfu-1"))
        .without_directory()
        .build();
    let alice = TestPeer::new("alice");

    let err = cluster
        .dispatcher
        .handle(
            &alice.peer,
            "broadcast",
            json!({ "rid": "room-1", "uid": "alice", "info": { "text": "hi" } }),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SignalError::ServiceUnavailable(Capability::Directory)
    ));
    assert_eq!(err.error_code(), 503);
    assert!(cluster.directory.calls().is_empty());
}

#[tokio::test]
async fn test_trickle_is_accepted_and_ignored() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    let result = cluster
        .dispatcher
        .handle(
            &alice.peer,
            "trickle",
            json!({ "rid": "room-1", "mid": "m1", "trickle": { "candidate": "a=1" } }),
        )
        .await
        .unwrap();

    assert_eq!(result, json!({}));
    assert!(cluster.connector.connections().is_empty());
    assert_eq!(cluster.relay("sfu-1").call_count(), 0);
}

// ============================================================================
// Room switch
// ============================================================================

#[tokio::test]
async fn test_join_other_room_leaves_current_room_first() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
        .await
        .unwrap();
    cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-2" }))
        .await
        .unwrap();

    assert_eq!(
        cluster.registry.get_room_by_peer(alice.id()).await,
        Some(RoomId::from("room-2"))
    );
    assert_eq!(cluster.registry.room_count().await, 1);

    let calls = cluster.directory.calls();
    let leave_at = calls
        .iter()
        .position(|call| {
            matches!(call, DirectoryCall::OnLeave { rid, .. } if rid.as_str() == "room-1")
        })
        .unwrap();
    let join_at = calls
        .iter()
        .position(|call| {
            matches!(call, DirectoryCall::OnJoin { rid, .. } if rid.as_str() == "room-2")
        })
        .unwrap();
    assert!(leave_at < join_at);
}

#[tokio::test]
async fn test_rejoin_same_room_does_not_leave() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    for _ in 0..2 {
        cluster
            .dispatcher
            .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
            .await
            .unwrap();
    }

    assert_eq!(
        cluster
            .directory
            .count(|call| matches!(call, DirectoryCall::OnLeave { .. })),
        0
    );
    assert_eq!(
        cluster
            .directory
            .count(|call| matches!(call, DirectoryCall::OnJoin { .. })),
        1
    );
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_leaves_current_room() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");
    cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
        .await
        .unwrap();

    cluster.dispatcher.disconnect(&alice.peer).await;

    assert_eq!(cluster.registry.peer_count().await, 0);
    assert_eq!(
        cluster
            .directory
            .count(|call| matches!(call, DirectoryCall::OnLeave { .. })),
        1
    );
}

#[tokio::test]
async fn test_disconnect_outside_room_is_noop() {
    let cluster = TestCluster::with_relays(&["sfu-1"]);
    let alice = TestPeer::new("alice");

    cluster.dispatcher.disconnect(&alice.peer).await;

    assert!(cluster.directory.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_drops_membership_without_directory() {
    let cluster = TestCluster::builder()
        .relay(MockRelay::new("sfu-1"))
        .without_directory()
        .build();
    let alice = TestPeer::new("alice");
    let _ = cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
        .await;
    assert_eq!(cluster.registry.peer_count().await, 1);

    cluster.dispatcher.disconnect(&alice.peer).await;

    assert_eq!(cluster.registry.peer_count().await, 0);
}

#[tokio::test]
async fn test_disconnect_with_failing_on_leave_still_clears() {
    let cluster = TestCluster::builder()
        .relay(MockRelay::new("sfu-1"))
        .directory(MockDirectory::new().with_on_leave_error(RpcError::new(14, "unavailable")))
        .build();
    let alice = TestPeer::new("alice");
    cluster
        .dispatcher
        .handle(&alice.peer, "join", json!({ "rid": "room-1" }))
        .await
        .unwrap();

    cluster.dispatcher.disconnect(&alice.peer).await;

    assert_eq!(cluster.registry.room_count().await, 0);
}
