use duet_client::session::SessionEvent;
use duet_core::MediaKind;

use crate::integration::session_tests::sender_id;
use crate::integration::{TestCall, init_tracing, wait_for_event};

#[tokio::test]
async fn test_toggle_keeps_sender_tracks() {
    init_tracing();

    let call = TestCall::new();
    let (alice, mut bob) = call.connected_pair("alice", "bob").await;

    let video = sender_id(&alice, MediaKind::Video).await;
    let audio = sender_id(&alice, MediaKind::Audio).await;

    assert!(!alice.handle.toggle_video().await.expect("toggle video"));
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::RemoteMedia(s) if !s.is_remote_camera_on)
    })
    .await;

    assert!(!alice.handle.toggle_audio().await.expect("toggle audio"));
    let snapshot = alice.handle.snapshot().await.expect("snapshot");
    assert!(!snapshot.local_media.video_enabled);
    assert!(!snapshot.local_media.audio_enabled);

    // Muting never swaps or renegotiates the outgoing tracks.
    assert_eq!(sender_id(&alice, MediaKind::Video).await, video);
    assert_eq!(sender_id(&alice, MediaKind::Audio).await, audio);
    assert_eq!(alice.transports.created(), 1);

    assert!(alice.handle.toggle_video().await.expect("toggle video back"));
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::RemoteMedia(s) if s.is_remote_camera_on)
    })
    .await;
    assert_eq!(sender_id(&alice, MediaKind::Video).await, video);
}

#[tokio::test]
async fn test_own_announcements_are_not_mirrored() {
    init_tracing();

    let call = TestCall::new();
    let (alice, mut bob) = call.connected_pair("alice", "bob").await;

    // The relay echoes alice's announcement back to her as well.
    alice.handle.toggle_video().await.expect("toggle video");
    wait_for_event(&mut bob.events, |e| {
        matches!(e, SessionEvent::RemoteMedia(s) if !s.is_remote_camera_on)
    })
    .await;

    let snapshot = alice.handle.snapshot().await.expect("snapshot");
    assert!(snapshot.remote_media.is_remote_camera_on);
    assert!(!snapshot.local_media.video_enabled);
}

#[tokio::test]
async fn test_local_media_event_follows_toggle() {
    init_tracing();

    let call = TestCall::new();
    let (mut alice, _bob) = call.connected_pair("alice", "bob").await;

    alice.handle.toggle_audio().await.expect("toggle audio");
    let event = wait_for_event(&mut alice.events, |e| {
        matches!(e, SessionEvent::LocalMedia(m) if !m.audio_enabled)
    })
    .await;
    match event {
        SessionEvent::LocalMedia(m) => {
            assert!(m.video_enabled);
            assert!(!m.is_screen_sharing);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_adding_an_existing_kind_is_rejected() {
    init_tracing();

    let call = TestCall::new();
    let alice = call.join("alice").await;

    let err = alice
        .handle
        .add_track(MediaKind::Audio, None)
        .await
        .unwrap_err();
    assert!(
        matches!(err, duet_client::SessionError::TrackExists(MediaKind::Audio)),
        "{err}"
    );
}
