use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type RoomId = i64;
pub type UserId = i64;

/// Ids generated locally for optimistic sends start with this prefix.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Returns true for a locally generated, not yet confirmed message id.
pub fn is_provisional_id(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    System,
    #[serde(other)]
    Unknown,
}

/// Best-known display data for a user. Messages carry a copy taken at
/// ingestion time, not a live reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub nickname: String,
    pub avatar: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: RoomId,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    pub text: String,
    pub sender: UserProfile,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_provisional(&self) -> bool {
        is_provisional_id(&self.id)
    }

    /// Text shown in the thread list for this message.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Image => "[image]".to_string(),
            _ => self.text.clone(),
        }
    }
}

/// One row of the thread list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: RoomId,
    pub title: String,
    pub avatar: String,
    pub last_message: String,
    /// Timestamp of the last activity; drives ordering.
    pub last_at: Option<DateTime<Utc>>,
    /// Display label derived from `last_at`.
    pub time: String,
    pub unread: u32,
    pub is_group: bool,
}
