use async_trait::async_trait;

use storechat_types::api::{CreateRoomRequest, CreateRoomResponse, HistoryItem, RoomListItem};
use storechat_types::models::RoomId;

use crate::error::Result;

/// The storefront's chat REST endpoints.
#[async_trait]
pub trait RoomsApi: Send + Sync {
    /// `GET /rooms/mine?limit=N`
    async fn list_rooms(&self, limit: u32) -> Result<Vec<RoomListItem>>;

    /// `GET /history?room=<id>&limit=N`, oldest first.
    async fn history(&self, room_id: RoomId, limit: u32) -> Result<Vec<HistoryItem>>;

    /// `POST /rooms`
    async fn create_room(&self, request: &CreateRoomRequest) -> Result<CreateRoomResponse>;

    /// `PATCH /rooms/{id}/read`
    async fn mark_read(&self, room_id: RoomId) -> Result<()>;
}
