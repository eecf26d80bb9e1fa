//! Runs a [`SyncCore`] on a single tokio task.
//!
//! User commands, transport events and finished REST calls all arrive on
//! channels and are applied one at a time, so the core never sees concurrent
//! mutation. REST calls run on their own tasks and never block the loop.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use storechat_types::api::RoomKind;
use storechat_types::models::{Message, RoomId, Thread, UserId};

use crate::engine::{ConnectionState, RestCall, RestOutcome, SyncCore};
use crate::error::{Result, SyncError};
use crate::profile::ProfilePatch;
use crate::rest::RoomsApi;
use crate::transport::TransportEvent;

/// Operations accepted by the sync task.
#[derive(Debug, Clone)]
pub enum Command {
    SetActiveRoom(RoomId),
    SendText { room_id: RoomId, text: String },
    MarkRead(RoomId),
    ReloadRooms,
    LoadHistory(RoomId),
    OpenRoom {
        kind: RoomKind,
        members: Vec<UserId>,
        title: Option<String>,
    },
    SetIdentity { user_id: UserId, patch: ProfilePatch },
    Shutdown,
}

/// What a UI needs to render, published after every handled event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: ConnectionState,
    pub active_room: Option<RoomId>,
    pub threads: Vec<Thread>,
    /// Messages of the active room, oldest first.
    pub messages: Vec<Message>,
}

impl Snapshot {
    fn of(core: &SyncCore) -> Self {
        let active_room = core.active_room();
        Self {
            state: core.state(),
            active_room,
            threads: core.threads().to_vec(),
            messages: active_room
                .map(|room| core.messages(room).to_vec())
                .unwrap_or_default(),
        }
    }
}

/// Cheap, cloneable front end to a running sync task.
#[derive(Clone)]
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SyncHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| SyncError::ChannelClosed)
    }

    pub fn set_active_room(&self, room_id: RoomId) -> Result<()> {
        self.send(Command::SetActiveRoom(room_id))
    }

    pub fn send_text(&self, room_id: RoomId, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendText {
            room_id,
            text: text.into(),
        })
    }

    pub fn mark_read(&self, room_id: RoomId) -> Result<()> {
        self.send(Command::MarkRead(room_id))
    }

    pub fn reload_rooms(&self) -> Result<()> {
        self.send(Command::ReloadRooms)
    }

    pub fn load_history(&self, room_id: RoomId) -> Result<()> {
        self.send(Command::LoadHistory(room_id))
    }

    pub fn open_room(
        &self,
        kind: RoomKind,
        members: Vec<UserId>,
        title: Option<String>,
    ) -> Result<()> {
        self.send(Command::OpenRoom {
            kind,
            members,
            title,
        })
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that wakes on every published state.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

/// Start the sync task. It runs until [`SyncHandle::shutdown`] is called or
/// every handle is dropped.
pub fn spawn(
    core: SyncCore,
    api: Arc<dyn RoomsApi>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
) -> (SyncHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::of(&core));

    let task = tokio::spawn(run(core, api, commands_rx, events, snapshot_tx));

    (
        SyncHandle {
            commands: commands_tx,
            snapshots: snapshot_rx,
        },
        task,
    )
}

async fn run(
    mut core: SyncCore,
    api: Arc<dyn RoomsApi>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    snapshots: watch::Sender<Snapshot>,
) {
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel::<RestOutcome>();
    let mut events_open = true;

    core.begin_connect();
    snapshots.send_replace(Snapshot::of(&core));

    loop {
        let calls = tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => apply_command(&mut core, command),
            },
            event = events.recv(), if events_open => match event {
                Some(event) => core.handle_event(event),
                None => {
                    info!("Transport event stream ended");
                    events_open = false;
                    core.handle_event(TransportEvent::Close)
                }
            },
            Some(outcome) = outcomes.recv() => core.apply(outcome),
        };

        for call in calls {
            dispatch(api.clone(), call, outcome_tx.clone());
        }
        snapshots.send_replace(Snapshot::of(&core));
    }

    core.shutdown();
    snapshots.send_replace(Snapshot::of(&core));
    info!("Sync task stopped");
}

fn apply_command(core: &mut SyncCore, command: Command) -> Vec<RestCall> {
    debug!("Command: {:?}", command);
    match command {
        Command::SetActiveRoom(room_id) => core.set_active_room(room_id),
        Command::SendText { room_id, text } => core.send_text(room_id, &text),
        Command::MarkRead(room_id) => core.mark_read(room_id),
        Command::ReloadRooms => core.reload_rooms(),
        Command::LoadHistory(room_id) => core.load_history(room_id),
        Command::OpenRoom {
            kind,
            members,
            title,
        } => core.open_room(kind, members, title),
        Command::SetIdentity { user_id, patch } => {
            core.set_identity(user_id, patch);
            Vec::new()
        }
        Command::Shutdown => Vec::new(),
    }
}

fn dispatch(api: Arc<dyn RoomsApi>, call: RestCall, outcomes: mpsc::UnboundedSender<RestOutcome>) {
    tokio::spawn(async move {
        let outcome = match call {
            RestCall::ReloadRooms { limit } => RestOutcome::Rooms(api.list_rooms(limit).await),
            RestCall::LoadHistory { room_id, limit } => RestOutcome::History {
                room_id,
                result: api.history(room_id, limit).await,
            },
            RestCall::MarkRead { room_id, at } => RestOutcome::ReadAck {
                room_id,
                at,
                result: api.mark_read(room_id).await,
            },
            RestCall::CreateRoom(request) => {
                RestOutcome::RoomCreated(api.create_room(&request).await)
            }
        };
        // The loop may already be gone during shutdown.
        let _ = outcomes.send(outcome);
    });
}
