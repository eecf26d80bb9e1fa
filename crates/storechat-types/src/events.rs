use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ProfilePayload;
use crate::models::{MessageKind, RoomId, UserId};
use crate::wire::{first, id_from_value, int_from_value, time_from_value};

const ROOM_KEYS: &[&str] = &["threadId", "room", "roomId", "room_id"];
const USER_KEYS: &[&str] = &["userId", "from_user_id", "user_id"];
const TEXT_KEYS: &[&str] = &["text", "message"];
const CREATED_KEYS: &[&str] = &["createdAt", "created_at"];
const READ_AT_KEYS: &[&str] = &["at", "createdAt", "created_at"];

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Subscribe this connection to a room's events
    #[serde(rename_all = "camelCase")]
    Join { room_id: RoomId, user_id: UserId },

    /// Unsubscribe from a room
    #[serde(rename_all = "camelCase")]
    Leave { room_id: RoomId },

    /// Post a text message
    #[serde(rename_all = "camelCase")]
    SendText {
        room_id: RoomId,
        user_id: UserId,
        text: String,
    },

    /// Broadcast that the user has read the room up to `at`
    #[serde(rename_all = "camelCase")]
    SendRead {
        room_id: RoomId,
        user_id: UserId,
        at: DateTime<Utc>,
    },
}

impl ClientCommand {
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Join { room_id, .. }
            | Self::Leave { room_id }
            | Self::SendText { room_id, .. }
            | Self::SendRead { room_id, .. } => *room_id,
        }
    }
}

/// Raw frame envelope as it arrives from the gateway.
#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Events sent FROM server TO client, already normalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(InboundMessage),
    Joined(JoinedRoom),
    Read(ReadReceipt),
}

impl ServerEvent {
    /// Decode a text frame. Unknown event types and payloads missing the
    /// fields the core needs yield `Ok(None)`; only malformed JSON is an error.
    pub fn decode(text: &str) -> Result<Option<Self>, serde_json::Error> {
        let frame: Frame = serde_json::from_str(text)?;
        let event = match frame.kind.as_str() {
            "message" => InboundMessage::from_payload(&frame.data).map(Self::Message),
            "joined" => JoinedRoom::from_payload(&frame.data).map(Self::Joined),
            "read" => ReadReceipt::from_payload(&frame.data).map(Self::Read),
            _ => None,
        };
        Ok(event)
    }

    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Message(m) => m.room_id,
            Self::Joined(j) => j.room_id,
            Self::Read(r) => r.room_id,
        }
    }
}

/// A chat message pushed by the server. Optional fields are resolved by the
/// sync core (fallback id, arrival time, cached profile).
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: Option<String>,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub kind: MessageKind,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub sender: Option<ProfilePayload>,
}

impl InboundMessage {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let room_id = first(obj, ROOM_KEYS).and_then(int_from_value)?;

        let sender = obj
            .get("sender")
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value::<ProfilePayload>(v.clone()).ok());

        let user_id = first(obj, USER_KEYS)
            .and_then(int_from_value)
            .or_else(|| sender.as_ref().map(|s| s.id))?;

        let text = first(obj, TEXT_KEYS)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let kind = obj
            .get("type")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        Some(Self {
            id: obj.get("id").and_then(id_from_value),
            room_id,
            user_id,
            kind,
            text,
            created_at: first(obj, CREATED_KEYS).and_then(time_from_value),
            sender,
        })
    }
}

/// Acknowledgement that the server subscribed a connection to a room.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRoom {
    pub room_id: RoomId,
    pub user_id: Option<UserId>,
}

impl JoinedRoom {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        Some(Self {
            room_id: first(obj, ROOM_KEYS).and_then(int_from_value)?,
            user_id: first(obj, USER_KEYS).and_then(int_from_value),
        })
    }
}

/// A user marked a room as read, possibly from another device.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadReceipt {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub at: Option<DateTime<Utc>>,
}

impl ReadReceipt {
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        Some(Self {
            room_id: first(obj, ROOM_KEYS).and_then(int_from_value)?,
            user_id: first(obj, USER_KEYS).and_then(int_from_value)?,
            at: first(obj, READ_AT_KEYS).and_then(time_from_value),
        })
    }
}
