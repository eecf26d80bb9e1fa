use std::collections::{HashMap, HashSet};

use storechat_types::models::RoomId;

/// Message ids already admitted per room. Only grows; used to drop
/// retransmitted frames before they reach reconciliation.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    rooms: HashMap<RoomId, HashSet<String>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, room_id: RoomId, message_id: &str) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|ids| ids.contains(message_id))
    }

    /// Returns true if the id was not seen before.
    pub fn mark_seen(&mut self, room_id: RoomId, message_id: &str) -> bool {
        self.rooms
            .entry(room_id)
            .or_default()
            .insert(message_id.to_string())
    }
}
