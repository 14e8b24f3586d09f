use bytes::Bytes;
use duet_client::api::{ApiClient, ChunkStorage, MeetingApi, TakeProvider};
use duet_client::config::ApiConfig;
use duet_client::error::ApiError;
use duet_client::recording::{ChunkDestination, ChunkTask};
use duet_core::{MediaKind, ParticipantId, RoomId, TakeId};

use super::{ApiServer, PutObject};
use crate::integration::{init_tracing, room};

fn client(server: &ApiServer) -> ApiClient {
    ApiClient::new(&ApiConfig {
        base_url: format!("{}/", server.base_url),
    })
}

fn destination(participant: &str, kind: MediaKind, index: u32) -> ChunkDestination {
    let task = ChunkTask::new(Bytes::from_static(b"chunk"), kind, TakeId::from("T42"), index);
    ChunkDestination::for_task(&room(), &ParticipantId::from(participant), &task)
}

#[tokio::test]
async fn test_create_take() {
    init_tracing();

    let server = ApiServer::start().await;
    let api = client(&server);

    assert_eq!(api.create_take(&room()).await.unwrap(), TakeId::from("T42"));
    assert_eq!(api.create_take(&room()).await.unwrap(), TakeId::from("T43"));
    assert_eq!(*server.take_requests.lock(), vec!["ROOM1", "ROOM1"]);
}

#[tokio::test]
async fn test_create_take_failure_carries_status() {
    init_tracing();

    let server = ApiServer::start().await;
    let err = client(&server)
        .create_take(&RoomId("BROKEN".to_owned()))
        .await
        .unwrap_err();
    match err {
        ApiError::Status { endpoint, status } => {
            assert_eq!(status, 500);
            assert_eq!(endpoint, "/api/takes/create/BROKEN");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn test_two_step_chunk_upload() {
    init_tracing();

    let server = ApiServer::start().await;
    let api = client(&server);

    let url = api
        .upload_target(&destination("alice", MediaKind::Audio, 3))
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/bucket/ROOM1/T42/alice/audio_3.webm?signature=abc",
            server.base_url
        )
    );

    api.put_chunk(&url, "audio/webm", Bytes::from_static(b"opus-frames"))
        .await
        .unwrap();

    assert_eq!(
        *server.objects.lock(),
        vec![PutObject {
            key: "ROOM1/T42/alice/audio_3.webm".to_owned(),
            content_type: Some("audio/webm".to_owned()),
            body: b"opus-frames".to_vec(),
        }]
    );
}

#[tokio::test]
async fn test_upload_errors() {
    init_tracing();

    let server = ApiServer::start().await;
    let api = client(&server);

    let err = api
        .upload_target(&destination("mallory", MediaKind::Video, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 403, .. }), "{err}");

    let err = api
        .upload_target(&destination("garbled", MediaKind::Video, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "{err}");

    let url = api
        .upload_target(&destination("alice", MediaKind::Video, 9))
        .await
        .unwrap();
    let err = api
        .put_chunk(&url, "video/webm", Bytes::from_static(b"vp8"))
        .await
        .unwrap_err();
    match err {
        ApiError::Status { endpoint, status } => {
            assert_eq!(status, 503);
            assert!(!endpoint.contains("signature"), "credentials leaked: {endpoint}");
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(server.objects.lock().is_empty());
}

#[tokio::test]
async fn test_meetings() {
    init_tracing();

    let server = ApiServer::start().await;
    let api = client(&server);

    let meetings = api.list_meetings().await.unwrap();
    assert_eq!(meetings.len(), 2);
    assert_eq!(meetings[0].slug.as_deref(), Some("standup"));
    assert_eq!(meetings[0].takes[0].id, TakeId::from("T1"));
    assert_eq!(meetings[1].count.map(|c| c.takes), Some(0));

    let meeting = api.fetch_meeting("standup").await.unwrap();
    assert_eq!(meeting.id, "m1");

    let err = api.fetch_meeting("nope").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }), "{err}");
}
