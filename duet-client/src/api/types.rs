use duet_core::TakeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_recording: bool,
    #[serde(default)]
    pub takes: Vec<Take>,
    #[serde(rename = "_count", default, skip_serializing_if = "Option::is_none")]
    pub count: Option<MeetingCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingCount {
    pub takes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Take {
    pub id: TakeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMeeting {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invite {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedTake {
    pub take: TakeId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadTarget {
    #[serde(rename = "presignedUrl")]
    pub presigned_url: String,
}
