use std::collections::HashSet;

use tracing::{debug, warn};

use storechat_types::events::ClientCommand;
use storechat_types::models::{RoomId, UserId};

use crate::transport::Transport;

/// Rooms joined on the current connection instance.
#[derive(Debug, Clone, Default)]
pub struct RoomSubscriptions {
    joined: HashSet<RoomId>,
}

impl RoomSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a `join` for `room_id` unless this connection already has one.
    /// Returns true if a join was sent.
    pub fn ensure_joined(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        transport: &dyn Transport,
    ) -> bool {
        if room_id <= 0 || user_id <= 0 || self.joined.contains(&room_id) {
            return false;
        }
        match transport.send(ClientCommand::Join { room_id, user_id }) {
            Ok(()) => {
                debug!("Joined room {}", room_id);
                self.joined.insert(room_id);
                true
            }
            Err(e) => {
                warn!("Join for room {} not sent: {}", room_id, e);
                false
            }
        }
    }

    pub fn is_joined(&self, room_id: RoomId) -> bool {
        self.joined.contains(&room_id)
    }

    /// Forget every join; called when a new connection instance opens.
    pub fn reset(&mut self) {
        self.joined.clear();
    }
}
