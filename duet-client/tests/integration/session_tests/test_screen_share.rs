use duet_client::SessionError;
use duet_client::error::NegotiationError;
use duet_client::session::SessionEvent;
use duet_core::MediaKind;

use crate::integration::session_tests::sender_id;
use crate::integration::{TestCall, init_tracing, wait_for_event};

#[tokio::test]
async fn test_screen_share_reverts_when_display_ends() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, mut bob) = call.connected_pair("alice", "bob").await;
    let camera = sender_id(&alice, MediaKind::Video).await;

    alice
        .handle
        .start_screen_share()
        .await
        .expect("screen share starts");
    let shared = sender_id(&alice, MediaKind::Video).await;
    assert_ne!(shared, camera);
    assert!(alice.capture.open_log().iter().any(|d| d == "screen:0"));
    assert!(
        alice
            .handle
            .snapshot()
            .await
            .expect("snapshot")
            .local_media
            .is_screen_sharing
    );

    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::RemoteMedia(s) if s.is_remote_screen_sharing)
    })
    .await;

    // The swap happens on the existing sender, without a new offer.
    assert_eq!(alice.transports.created(), 1);
    assert!(!call.hub.received_from(&alice.id).contains(&"offer"));

    // The user stops sharing from the system UI.
    assert_eq!(alice.capture.end_display(), 1);
    wait_for_event(&mut alice.events, |e| matches!(e, SessionEvent::ScreenShareEnded)).await;

    assert_eq!(sender_id(&alice, MediaKind::Video).await, camera);
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::RemoteMedia(s) if !s.is_remote_screen_sharing)
    })
    .await;
}

#[tokio::test]
async fn test_stop_screen_share_restores_camera() {
    init_tracing();

    let call = TestCall::new();
    let (alice, _bob) = call.connected_pair("alice", "bob").await;
    let camera = sender_id(&alice, MediaKind::Video).await;

    alice.handle.start_screen_share().await.expect("share");
    // A second start while sharing changes nothing.
    alice.handle.start_screen_share().await.expect("share again");
    let shared = sender_id(&alice, MediaKind::Video).await;

    assert!(alice.handle.stop_screen_share().await.expect("stop"));
    assert_eq!(sender_id(&alice, MediaKind::Video).await, camera);
    assert!(!alice.handle.stop_screen_share().await.expect("stop again"));

    let opened: Vec<_> = alice
        .capture
        .open_log()
        .into_iter()
        .filter(|d| d == "screen:0")
        .collect();
    assert_eq!(opened.len(), 1);
    assert_ne!(shared, camera);
}

#[tokio::test]
async fn test_screen_share_needs_a_link() {
    init_tracing();

    let call = TestCall::new();
    let alice = call.join("alice").await;

    let err = alice.handle.start_screen_share().await.unwrap_err();
    assert!(
        matches!(err, SessionError::Negotiation(NegotiationError::NoLink)),
        "{err}"
    );
    assert!(!alice.capture.open_log().iter().any(|d| d == "screen:0"));
}

#[tokio::test]
async fn test_failed_replace_keeps_camera() {
    init_tracing();

    let call = TestCall::new();
    let (alice, _bob) = call.connected_pair("alice", "bob").await;
    let camera = sender_id(&alice, MediaKind::Video).await;

    alice.transports.set_fail_replace(true);
    let err = alice.handle.start_screen_share().await.unwrap_err();
    assert!(matches!(err, SessionError::Negotiation(_)), "{err}");

    assert_eq!(sender_id(&alice, MediaKind::Video).await, camera);
    let snapshot = alice.handle.snapshot().await.expect("snapshot");
    assert!(!snapshot.local_media.is_screen_sharing);
    // The display capture was released again.
    assert_eq!(alice.capture.end_display(), 0);
}
