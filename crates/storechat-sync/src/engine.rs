use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use storechat_types::api::{
    CreateRoomRequest, CreateRoomResponse, HistoryItem, RoomKind, RoomListItem,
};
use storechat_types::events::{ClientCommand, InboundMessage, ReadReceipt};
use storechat_types::models::{
    Message, MessageKind, PROVISIONAL_PREFIX, RoomId, Thread, UserId, UserProfile,
};

use crate::config::SyncConfig;
use crate::error::Result;
use crate::profile::{ProfileCache, ProfilePatch};
use crate::reconcile;
use crate::seen::SeenSet;
use crate::subscriptions::RoomSubscriptions;
use crate::threads::{ThreadList, format_time_label};
use crate::transport::{Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Request/response work the core wants done. The caller runs it off the
/// event loop and feeds the matching [`RestOutcome`] back via
/// [`SyncCore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum RestCall {
    ReloadRooms { limit: u32 },
    LoadHistory { room_id: RoomId, limit: u32 },
    MarkRead { room_id: RoomId, at: DateTime<Utc> },
    CreateRoom(CreateRoomRequest),
}

#[derive(Debug)]
pub enum RestOutcome {
    Rooms(Result<Vec<RoomListItem>>),
    History {
        room_id: RoomId,
        result: Result<Vec<HistoryItem>>,
    },
    ReadAck {
        room_id: RoomId,
        at: DateTime<Utc>,
        result: Result<()>,
    },
    RoomCreated(Result<CreateRoomResponse>),
}

/// Chat state for one signed-in session.
///
/// Every method runs to completion without awaiting; the owner must call
/// them from a single task so events are applied in arrival order.
pub struct SyncCore {
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    state: ConnectionState,
    me: Option<UserId>,
    profiles: ProfileCache,
    seen: SeenSet,
    messages: HashMap<RoomId, Vec<Message>>,
    subscriptions: RoomSubscriptions,
    threads: ThreadList,
}

impl SyncCore {
    pub fn new(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let mut profiles = ProfileCache::new(config.default_avatar.clone());
        let me = config.user_id.filter(|id| *id > 0);
        if let Some(id) = me {
            profiles.snapshot(id);
        }
        Self {
            config,
            transport,
            state: ConnectionState::Disconnected,
            me,
            profiles,
            seen: SeenSet::new(),
            messages: HashMap::new(),
            subscriptions: RoomSubscriptions::new(),
            threads: ThreadList::new(),
        }
    }

    // -- Accessors --

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.me
    }

    pub fn threads(&self) -> &[Thread] {
        self.threads.threads()
    }

    pub fn active_room(&self) -> Option<RoomId> {
        self.threads.active()
    }

    pub fn messages(&self, room_id: RoomId) -> &[Message] {
        self.messages.get(&room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn profile(&self, user_id: UserId) -> Option<&UserProfile> {
        self.profiles.get(user_id)
    }

    // -- Identity --

    /// Establish (or refresh) the local user. Sends stay no-ops until set.
    pub fn set_identity(&mut self, user_id: UserId, patch: ProfilePatch) {
        if user_id <= 0 {
            debug!("Ignoring identity with non-positive id {}", user_id);
            return;
        }
        self.me = Some(user_id);
        self.profiles.upsert(user_id, patch);
    }

    // -- Connection lifecycle --

    /// The transport started dialing. A failed first attempt falls back to
    /// `Disconnected`, so every later attempt shows `Connecting` again.
    pub fn begin_connect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Stop for good: the transport is closed and later events cannot
    /// revive the session.
    pub fn shutdown(&mut self) {
        if self.state != ConnectionState::Closed {
            info!("Chat session closing");
            self.state = ConnectionState::Closed;
            self.transport.close();
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<RestCall> {
        match event {
            TransportEvent::Dialing => self.begin_connect(),
            TransportEvent::Open => return self.on_open(),
            TransportEvent::Close => self.on_connection_lost("closed"),
            TransportEvent::Error(err) => self.on_connection_lost(&err),
            TransportEvent::Message(msg) => self.on_inbound_message(msg),
            TransportEvent::Joined(joined) => {
                debug!("Server confirmed join of room {}", joined.room_id);
            }
            TransportEvent::Read(receipt) => self.on_read_receipt(receipt),
        }
        Vec::new()
    }

    fn on_open(&mut self) -> Vec<RestCall> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        info!("Gateway connected");
        self.state = ConnectionState::Connected;
        self.subscriptions.reset();
        self.rejoin_all();

        // Catch up on whatever happened while the socket was down.
        let mut calls = self.reload_rooms();
        if let Some(room_id) = self.threads.active() {
            calls.extend(self.load_history(room_id));
        }
        calls
    }

    fn on_connection_lost(&mut self, reason: &str) {
        self.state = match self.state {
            ConnectionState::Closed => return,
            ConnectionState::Connected | ConnectionState::Reconnecting => {
                warn!("Gateway connection lost: {}", reason);
                ConnectionState::Reconnecting
            }
            _ => {
                warn!("Gateway unavailable: {}", reason);
                ConnectionState::Disconnected
            }
        };
    }

    fn rejoin_all(&mut self) {
        let mut rooms = self.threads.room_ids();
        if let Some(active) = self.threads.active() {
            rooms.push(active);
        }
        for room_id in rooms {
            self.ensure_joined(room_id);
        }
    }

    fn ensure_joined(&mut self, room_id: RoomId) {
        // Joins issued while down would be lost; `on_open` replays them.
        if self.state != ConnectionState::Connected {
            return;
        }
        if let Some(me) = self.me {
            self.subscriptions
                .ensure_joined(room_id, me, self.transport.as_ref());
        }
    }

    // -- Inbound --

    fn on_inbound_message(&mut self, inbound: InboundMessage) {
        let room_id = inbound.room_id;
        let user_id = inbound.user_id;
        if room_id <= 0 || user_id <= 0 {
            debug!("Dropping message with room {} user {}", room_id, user_id);
            return;
        }

        let created_at = inbound.created_at.unwrap_or_else(Utc::now);
        let id = inbound
            .id
            .unwrap_or_else(|| {
                format!("{}:{}:{}", room_id, user_id, created_at.timestamp_millis())
            });

        if !self.seen.mark_seen(room_id, &id) {
            debug!("Duplicate message {} in room {}", id, room_id);
            return;
        }

        let patch = inbound
            .sender
            .as_ref()
            .filter(|s| s.id == user_id)
            .map(ProfilePatch::from)
            .unwrap_or_default();
        let sender = self.profiles.upsert(user_id, patch).clone();

        let message = Message {
            id,
            room_id,
            kind: inbound.kind,
            text: inbound.text,
            sender,
            created_at,
        };
        let preview = message.preview();

        let merged = reconcile::merge(room_id, self.messages(room_id), [message]);
        self.messages.insert(room_id, merged);

        let is_self = self.me == Some(user_id);
        self.threads
            .on_inbound_message(room_id, &preview, created_at, is_self);
    }

    fn on_read_receipt(&mut self, receipt: ReadReceipt) {
        // Per-peer receipts are a rendering concern; only our own matter here.
        if self.me.is_some() && self.me == Some(receipt.user_id) {
            debug!("Room {} read on another device", receipt.room_id);
            self.threads.on_mark_read(receipt.room_id);
        }
    }

    // -- Operations --

    /// Show `room_id`: join it, fetch its history and mark it read.
    pub fn set_active_room(&mut self, room_id: RoomId) -> Vec<RestCall> {
        if room_id <= 0 {
            debug!("Ignoring active room {}", room_id);
            return Vec::new();
        }
        self.threads.set_active(Some(room_id));
        self.ensure_joined(room_id);

        let mut calls = self.load_history(room_id);
        calls.extend(self.mark_read(room_id));
        calls
    }

    /// Optimistically append `text` to `room_id` and dispatch it. The
    /// provisional entry stays even if the dispatch fails.
    pub fn send_text(&mut self, room_id: RoomId, text: &str) -> Vec<RestCall> {
        if text.trim().is_empty() || room_id <= 0 {
            debug!("Ignoring blank send to room {}", room_id);
            return Vec::new();
        }
        let Some(me) = self.me else {
            debug!("Ignoring send to room {} without identity", room_id);
            return Vec::new();
        };

        let at = Utc::now();
        let message = Message {
            id: provisional_id(room_id, at),
            room_id,
            kind: MessageKind::Text,
            text: text.to_string(),
            sender: self.profiles.snapshot(me),
            created_at: at,
        };
        let merged = reconcile::merge(room_id, self.messages(room_id), [message]);
        self.messages.insert(room_id, merged);
        self.threads.on_outgoing_send(room_id, text, at);

        self.ensure_joined(room_id);
        if let Err(e) = self.transport.send(ClientCommand::SendText {
            room_id,
            user_id: me,
            text: text.to_string(),
        }) {
            warn!("Send to room {} not dispatched: {}", room_id, e);
        }

        self.mark_read(room_id)
    }

    /// Zero the unread counter now; the server acknowledgement follows.
    pub fn mark_read(&mut self, room_id: RoomId) -> Vec<RestCall> {
        if room_id <= 0 || self.me.is_none() {
            return Vec::new();
        }
        self.threads.on_mark_read(room_id);
        vec![RestCall::MarkRead {
            room_id,
            at: Utc::now(),
        }]
    }

    pub fn reload_rooms(&mut self) -> Vec<RestCall> {
        vec![RestCall::ReloadRooms {
            limit: self.config.room_list_limit,
        }]
    }

    pub fn load_history(&mut self, room_id: RoomId) -> Vec<RestCall> {
        if room_id <= 0 {
            return Vec::new();
        }
        self.messages.entry(room_id).or_default();
        vec![RestCall::LoadHistory {
            room_id,
            limit: self.config.history_limit,
        }]
    }

    /// Create a DM or group room; it becomes active once the server answers.
    pub fn open_room(
        &mut self,
        kind: RoomKind,
        members: Vec<UserId>,
        title: Option<String>,
    ) -> Vec<RestCall> {
        if self.me.is_none() || members.is_empty() || members.iter().any(|id| *id <= 0) {
            debug!("Ignoring room creation with members {:?}", members);
            return Vec::new();
        }
        vec![RestCall::CreateRoom(CreateRoomRequest {
            kind,
            members,
            title: title.filter(|t| !t.trim().is_empty()),
        })]
    }

    // -- REST results --

    pub fn apply(&mut self, outcome: RestOutcome) -> Vec<RestCall> {
        match outcome {
            RestOutcome::Rooms(Ok(rooms)) => self.on_rooms_loaded(rooms),
            RestOutcome::Rooms(Err(e)) => warn!("Room list reload failed: {}", e),

            RestOutcome::History {
                room_id,
                result: Ok(items),
            } => self.on_history_loaded(room_id, items),
            RestOutcome::History {
                room_id,
                result: Err(e),
            } => warn!("History for room {} failed: {}", room_id, e),

            RestOutcome::ReadAck {
                room_id,
                at,
                result: Ok(()),
            } => {
                if let Some(me) = self.me {
                    if let Err(e) = self.transport.send(ClientCommand::SendRead {
                        room_id,
                        user_id: me,
                        at,
                    }) {
                        warn!("Read broadcast for room {} not sent: {}", room_id, e);
                    }
                }
            }
            RestOutcome::ReadAck {
                room_id,
                result: Err(e),
                ..
            } => {
                warn!("Mark-read for room {} failed, resyncing rooms: {}", room_id, e);
                return self.reload_rooms();
            }

            RestOutcome::RoomCreated(Ok(resp)) => {
                info!("Room {} created", resp.room_id);
                let mut calls = self.reload_rooms();
                calls.extend(self.set_active_room(resp.room_id));
                return calls;
            }
            RestOutcome::RoomCreated(Err(e)) => warn!("Room creation failed: {}", e),
        }
        Vec::new()
    }

    fn on_rooms_loaded(&mut self, rooms: Vec<RoomListItem>) {
        info!("Loaded {} rooms", rooms.len());
        let threads: Vec<Thread> = rooms
            .into_iter()
            .filter(|r| r.id > 0)
            .map(|r| self.thread_from_room(r))
            .collect();
        self.threads.replace_all(threads);
        self.rejoin_all();
    }

    fn on_history_loaded(&mut self, room_id: RoomId, items: Vec<HistoryItem>) {
        if !self.threads.contains(room_id) && !self.messages.contains_key(&room_id) {
            debug!("Discarding history for untracked room {}", room_id);
            return;
        }

        let now = Utc::now();
        let batch: Vec<Message> = items
            .into_iter()
            .filter(|item| item.user_id > 0)
            .map(|item| {
                let patch = item
                    .sender
                    .as_ref()
                    .filter(|s| s.id == item.user_id)
                    .map(ProfilePatch::from)
                    .unwrap_or_default();
                let sender = self.profiles.upsert(item.user_id, patch).clone();
                self.seen.mark_seen(room_id, &item.id);
                Message {
                    id: item.id,
                    room_id,
                    kind: item.kind,
                    text: item.text,
                    sender,
                    created_at: item.created_at.unwrap_or(now),
                }
            })
            .collect();

        debug!("Merging {} history messages into room {}", batch.len(), room_id);
        let merged = reconcile::merge(room_id, self.messages(room_id), batch);
        self.messages.insert(room_id, merged);
    }

    fn thread_from_room(&mut self, room: RoomListItem) -> Thread {
        let is_group = room.kind == RoomKind::Group;
        let peer = room
            .peer
            .as_ref()
            .filter(|p| p.id > 0)
            .map(|p| self.profiles.upsert(p.id, ProfilePatch::from(p)).clone());
        let title = room.title.filter(|t| !t.trim().is_empty());

        let (title, avatar) = match (is_group, peer) {
            (false, Some(peer)) => (peer.nickname, peer.avatar),
            (true, _) => (
                title.unwrap_or_else(|| format!("Group ({})", room.member_count)),
                self.profiles.default_avatar().to_string(),
            ),
            (false, None) => (
                title.unwrap_or_else(|| format!("Room {}", room.id)),
                self.profiles.default_avatar().to_string(),
            ),
        };

        let last = room.last.unwrap_or_default();
        let now = Utc::now();
        Thread {
            id: room.id,
            title,
            avatar,
            last_message: last.text.unwrap_or_default(),
            last_at: last.created_at,
            time: last
                .created_at
                .map(|at| format_time_label(at, now))
                .unwrap_or_default(),
            unread: room.unread,
            is_group,
        }
    }
}

fn provisional_id(room_id: RoomId, at: DateTime<Utc>) -> String {
    format!(
        "{}{}-{}-{:08x}",
        PROVISIONAL_PREFIX,
        room_id,
        at.timestamp_millis(),
        rand::random::<u32>()
    )
}
