use crate::api::types::{CreateMeeting, CreatedTake, Invite, Meeting, Take, UploadTarget};
use crate::api::{ChunkStorage, MeetingApi, TakeProvider};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::recording::ChunkDestination;
use async_trait::async_trait;
use bytes::Bytes;
use duet_core::{RoomId, TakeId};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

/// `reqwest` client for the meeting service.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: &ApiConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        debug!("{} -> {}", endpoint, status);
        if !status.is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_owned(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(endpoint, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("{endpoint}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.json(path, self.http.get(self.url(path))).await
    }
}

#[async_trait]
impl MeetingApi for ApiClient {
    async fn create_meeting(&self, request: &CreateMeeting) -> Result<Meeting, ApiError> {
        let path = "/api/meeting/create-meeting";
        self.json(path, self.http.post(self.url(path)).json(request))
            .await
    }

    async fn list_meetings(&self) -> Result<Vec<Meeting>, ApiError> {
        self.get("/api/meeting").await
    }

    async fn list_invited_meetings(&self) -> Result<Vec<Meeting>, ApiError> {
        self.get("/api/meeting/invited").await
    }

    async fn fetch_meeting(&self, slug: &str) -> Result<Meeting, ApiError> {
        self.get(&format!("/api/meeting/{slug}")).await
    }

    async fn invite(&self, meeting_id: &str, invite: &Invite) -> Result<(), ApiError> {
        let path = format!("/api/meeting/invite/{meeting_id}");
        self.send(&path, self.http.post(self.url(&path)).json(invite))
            .await?;
        Ok(())
    }

    async fn list_takes(&self) -> Result<Vec<Take>, ApiError> {
        self.get("/api/takes").await
    }

    async fn fetch_take(&self, take_id: &TakeId) -> Result<Take, ApiError> {
        self.get(&format!("/api/takes/{take_id}")).await
    }
}

#[async_trait]
impl TakeProvider for ApiClient {
    async fn create_take(&self, room_id: &RoomId) -> Result<TakeId, ApiError> {
        let path = format!("/api/takes/create/{room_id}");
        let created: CreatedTake = self.json(&path, self.http.post(self.url(&path))).await?;
        Ok(created.take)
    }
}

#[async_trait]
impl ChunkStorage for ApiClient {
    async fn upload_target(&self, destination: &ChunkDestination) -> Result<String, ApiError> {
        let path = destination.upload_path();
        let target: UploadTarget = self.json(&path, self.http.post(self.url(&path))).await?;
        Ok(target.presigned_url)
    }

    async fn put_chunk(
        &self,
        url: &str,
        content_type: &'static str,
        payload: Bytes,
    ) -> Result<(), ApiError> {
        let request = self
            .http
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .body(payload);
        // The presigned URL carries credentials; keep it out of errors and logs.
        self.send("presigned upload", request).await?;
        Ok(())
    }
}
