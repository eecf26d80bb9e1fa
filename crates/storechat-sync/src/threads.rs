use chrono::{DateTime, Datelike, Local, Utc};
use tracing::debug;

use storechat_types::models::{RoomId, Thread};

/// Recency label for a thread row: time of day for today, month/day for
/// this year, full date otherwise. Both instants are shown in local time.
pub fn format_time_label(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let at = at.with_timezone(&Local);
    let now = now.with_timezone(&Local);
    if at.date_naive() == now.date_naive() {
        at.format("%H:%M").to_string()
    } else if at.year() == now.year() {
        at.format("%m/%d").to_string()
    } else {
        at.format("%Y/%m/%d").to_string()
    }
}

/// Thread list ordered by last activity, newest first, with unread counters.
///
/// Rooms only enter the list through [`ThreadList::replace_all`]; events for
/// rooms not in the list are ignored until the next reload.
#[derive(Debug, Clone, Default)]
pub struct ThreadList {
    threads: Vec<Thread>,
    active: Option<RoomId>,
}

impl ThreadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn get(&self, room_id: RoomId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == room_id)
    }

    pub fn contains(&self, room_id: RoomId) -> bool {
        self.get(room_id).is_some()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.threads.iter().map(|t| t.id).collect()
    }

    pub fn active(&self) -> Option<RoomId> {
        self.active
    }

    pub fn set_active(&mut self, room_id: Option<RoomId>) {
        self.active = room_id;
    }

    /// The local user sent `text` to `room_id`.
    pub fn on_outgoing_send(&mut self, room_id: RoomId, text: &str, at: DateTime<Utc>) -> bool {
        let Some(idx) = self.position(room_id) else {
            debug!("Outgoing send for unlisted room {}", room_id);
            return false;
        };
        self.threads[idx].unread = 0;
        self.touch(idx, text, at);
        true
    }

    /// A message arrived for `room_id`. Unread grows only for rooms not on
    /// screen and messages from someone else.
    pub fn on_inbound_message(
        &mut self,
        room_id: RoomId,
        text: &str,
        at: DateTime<Utc>,
        is_self: bool,
    ) -> bool {
        let Some(idx) = self.position(room_id) else {
            debug!("Inbound message for unlisted room {}", room_id);
            return false;
        };
        if !is_self && self.active != Some(room_id) {
            self.threads[idx].unread += 1;
        }
        self.touch(idx, text, at);
        true
    }

    pub fn on_mark_read(&mut self, room_id: RoomId) -> bool {
        match self.threads.iter_mut().find(|t| t.id == room_id) {
            Some(thread) => {
                thread.unread = 0;
                true
            }
            None => false,
        }
    }

    /// Replace everything with the server's view; its unread counts win.
    pub fn replace_all(&mut self, mut threads: Vec<Thread>) {
        // Stable: server order is kept among equal timestamps.
        threads.sort_by(|a, b| b.last_at.cmp(&a.last_at));
        self.threads = threads;
    }

    fn position(&self, room_id: RoomId) -> Option<usize> {
        self.threads.iter().position(|t| t.id == room_id)
    }

    /// Record activity and move the thread to the front. Live events are
    /// stamped by different clocks, so arrival order wins over timestamps.
    fn touch(&mut self, idx: usize, text: &str, at: DateTime<Utc>) {
        let mut thread = self.threads.remove(idx);
        thread.last_message = text.to_string();
        thread.last_at = Some(at);
        thread.time = format_time_label(at, Utc::now());
        self.threads.insert(0, thread);
    }
}
