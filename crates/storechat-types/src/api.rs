use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MessageKind, RoomId, UserId};
use crate::wire;

// -- Profiles --

/// Partial user data as it arrives from the server: room peers, message
/// senders. Either field may be missing or a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    #[serde(deserialize_with = "wire::de_int")]
    pub id: UserId,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

// -- Rooms --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Dm,
    Group,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "created_at", deserialize_with = "wire::de_opt_time")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of `GET /rooms/mine`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListItem {
    #[serde(deserialize_with = "wire::de_int")]
    pub id: RoomId,
    #[serde(default, rename = "type")]
    pub kind: RoomKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub peer: Option<ProfilePayload>,
    #[serde(default, alias = "member_count")]
    pub member_count: u32,
    #[serde(default)]
    pub last: Option<LastMessage>,
    #[serde(default)]
    pub unread: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateRoomRequest {
    #[serde(rename = "type")]
    pub kind: RoomKind,
    pub members: Vec<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    #[serde(alias = "room_id", deserialize_with = "wire::de_int")]
    pub room_id: RoomId,
}

// -- History --

/// One entry of `GET /history`, oldest first.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(deserialize_with = "wire::de_id")]
    pub id: String,
    #[serde(alias = "user_id", deserialize_with = "wire::de_int")]
    pub user_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default, alias = "created_at", deserialize_with = "wire::de_opt_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<ProfilePayload>,
}
