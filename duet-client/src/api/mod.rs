//! REST collaborator: meetings, takes and chunk upload targets.

mod client;
mod types;

pub use client::ApiClient;
pub use types::{CreateMeeting, Invite, Meeting, MeetingCount, Take};

use crate::error::ApiError;
use crate::recording::ChunkDestination;
use async_trait::async_trait;
use bytes::Bytes;
use duet_core::{RoomId, TakeId};

#[async_trait]
pub trait MeetingApi: Send + Sync {
    async fn create_meeting(&self, request: &CreateMeeting) -> Result<Meeting, ApiError>;

    async fn list_meetings(&self) -> Result<Vec<Meeting>, ApiError>;

    async fn list_invited_meetings(&self) -> Result<Vec<Meeting>, ApiError>;

    async fn fetch_meeting(&self, slug: &str) -> Result<Meeting, ApiError>;

    async fn invite(&self, meeting_id: &str, invite: &Invite) -> Result<(), ApiError>;

    async fn list_takes(&self) -> Result<Vec<Take>, ApiError>;

    async fn fetch_take(&self, take_id: &TakeId) -> Result<Take, ApiError>;
}

/// Hands out a fresh take id for every recording start.
#[async_trait]
pub trait TakeProvider: Send + Sync {
    async fn create_take(&self, room_id: &RoomId) -> Result<TakeId, ApiError>;
}

/// Two-step chunk upload: ask for a short-lived URL, then PUT the bytes there.
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    async fn upload_target(&self, destination: &ChunkDestination) -> Result<String, ApiError>;

    async fn put_chunk(
        &self,
        url: &str,
        content_type: &'static str,
        payload: Bytes,
    ) -> Result<(), ApiError>;
}
