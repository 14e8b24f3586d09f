use std::time::Duration;

use duet_client::capture::CaptureBackend;
use duet_client::negotiation::ConnectionState;
use duet_client::session::{CallEndReason, SessionEvent};
use duet_client::signaling::ChannelEvent;
use duet_client::transport::{LinkConnectionState, TransportEvent};
use duet_core::MediaKind;

use crate::integration::{TestCall, TestParticipant, init_tracing, wait_for_event};

async fn wait_closed(participant: &TestParticipant) {
    tokio::time::timeout(Duration::from_secs(5), participant.handle.closed())
        .await
        .expect("Session loop did not finish");
    assert!(participant.handle.is_closed());
}

#[tokio::test]
async fn test_leave_notifies_remote_and_releases_devices() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, mut bob) = call.connected_pair("alice", "bob").await;

    bob.handle.leave().await;
    let ended = wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(ended, SessionEvent::CallEnded(CallEndReason::Left));
    wait_closed(&bob).await;

    match wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::RemoteLeft { .. })).await {
        SessionEvent::RemoteLeft { participant_id } => assert_eq!(participant_id, bob.id),
        other => panic!("unexpected event {other:?}"),
    }

    let snapshot = alice.handle.snapshot().await.expect("alice snapshot");
    assert_eq!(snapshot.connection_state, ConnectionState::New);
    assert_eq!(snapshot.remote_id, None);
    assert_eq!(snapshot.participants, vec![alice.id.clone()]);
    assert!(snapshot.sender_track_ids.is_empty());

    let alice_link = alice.transports.last().expect("alice link");
    assert_eq!(alice_link.log().last().map(String::as_str), Some("close"));

    // Bob's camera is free again.
    assert!(
        bob.capture
            .open(MediaKind::Video, Some("synthetic-camera-0"))
            .await
            .is_ok()
    );
    assert_eq!(call.hub.room_members(&call.room_id), vec![alice.id.clone()]);

    // Leaving twice is harmless.
    bob.handle.leave().await;
}

#[tokio::test]
async fn test_end_call_ends_both_sessions() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, mut bob) = call.connected_pair("alice", "bob").await;

    alice.handle.end_call().await;

    let ended = wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(ended, SessionEvent::CallEnded(CallEndReason::Ended));
    let ended = wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(ended, SessionEvent::CallEnded(CallEndReason::EndedRemotely));

    wait_closed(&alice).await;
    wait_closed(&bob).await;

    let sent = call.hub.received_from(&alice.id);
    let end = sent.iter().position(|n| *n == "end-call").expect("end-call sent");
    let leave = sent.iter().position(|n| *n == "leave-room").expect("leave-room sent");
    assert!(end < leave);
    assert!(call.hub.received_from(&bob.id).contains(&"leave-room"));
}

#[tokio::test]
async fn test_link_failure_ends_initiator_session() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, mut bob) = call.connected_pair("alice", "bob").await;

    let link = bob.transports.last().expect("bob link");
    link.emit(TransportEvent::ConnectionState(LinkConnectionState::Failed));

    let ended = wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(
        ended,
        SessionEvent::CallEnded(CallEndReason::LinkLost(ConnectionState::Failed))
    );
    wait_closed(&bob).await;

    // Bob initiated, so he announced his departure.
    let leaves = call
        .hub
        .received_from(&bob.id)
        .into_iter()
        .filter(|n| *n == "leave-room")
        .count();
    assert_eq!(leaves, 1);
    wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::RemoteLeft { .. })).await;
}

#[tokio::test]
async fn test_polite_side_ends_silently_on_link_loss() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, _bob) = call.connected_pair("alice", "bob").await;

    let link = alice.transports.last().expect("alice link");
    link.emit(TransportEvent::ConnectionState(LinkConnectionState::Disconnected));

    let ended = wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(
        ended,
        SessionEvent::CallEnded(CallEndReason::LinkLost(ConnectionState::Disconnected))
    );
    wait_closed(&alice).await;
    assert!(!call.hub.received_from(&alice.id).contains(&"leave-room"));
}

#[tokio::test]
async fn test_third_participant_is_rejected() {
    init_tracing();

    let call = TestCall::new();
    let (_alice, _bob) = call.connected_pair("alice", "bob").await;
    let mut carol = call.join("carol").await;

    let ended = wait_for_event(&mut carol.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(
        ended,
        SessionEvent::CallEnded(CallEndReason::JoinRejected("Room is full".to_owned()))
    );
    wait_closed(&carol).await;
    assert!(
        carol
            .capture
            .open(MediaKind::Video, Some("synthetic-camera-0"))
            .await
            .is_ok()
    );
    assert_eq!(call.hub.room_members(&call.room_id).len(), 2);
}

#[tokio::test]
async fn test_reconnect_rejoins_room_and_reannounces() {
    init_tracing();

    let call = TestCall::new();
    let (_alice, mut bob) = call.connected_pair("alice", "bob").await;

    bob.peer.inject(ChannelEvent::Disconnected);
    wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::SignalingDisconnected)).await;

    bob.peer.inject(ChannelEvent::Reconnected { attempt: 1 });
    wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::SignalingReconnected)).await;

    let sent = call.hub.received_from(&bob.id);
    assert_eq!(sent.iter().filter(|n| **n == "join-room").count(), 2);
    assert_eq!(sent.last(), Some(&"media-state-change"));

    // The peer link survives a relay hiccup.
    let snapshot = bob.handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.connection_state, ConnectionState::Connected);
    assert_eq!(bob.transports.created(), 1);
}

#[tokio::test]
async fn test_giving_up_on_relay_ends_session() {
    init_tracing();

    let call = TestCall::new();
    let (_alice, mut bob) = call.connected_pair("alice", "bob").await;

    bob.peer.inject(ChannelEvent::ReconnectFailed { attempts: 5 });
    let ended = wait_for_event(&mut bob.events, |e| matches!(e, SessionEvent::CallEnded(_))).await;
    assert_eq!(ended, SessionEvent::CallEnded(CallEndReason::SignalingLost));
    wait_closed(&bob).await;
}

#[tokio::test]
async fn test_dropping_every_handle_leaves_the_room() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, bob) = call.connected_pair("alice", "bob").await;
    let bob_id = bob.id.clone();

    drop(bob);
    match wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::RemoteLeft { .. })).await {
        SessionEvent::RemoteLeft { participant_id } => assert_eq!(participant_id, bob_id),
        other => panic!("unexpected event {other:?}"),
    }
}
