use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};

use storechat_sync::actor::{self, Snapshot};
use storechat_sync::{
    ConnectionState, Result, RoomsApi, SyncConfig, SyncCore, SyncError, Transport,
    TransportEvent,
};
use storechat_types::api::{
    CreateRoomRequest, CreateRoomResponse, HistoryItem, ProfilePayload, RoomKind, RoomListItem,
};
use storechat_types::events::{ClientCommand, InboundMessage};

const ME: i64 = 7;

#[derive(Default)]
struct FakeApi {
    list_calls: AtomicUsize,
    read_calls: Mutex<Vec<i64>>,
    fail_read: bool,
}

#[async_trait]
impl RoomsApi for FakeApi {
    async fn list_rooms(&self, _limit: u32) -> Result<Vec<RoomListItem>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RoomListItem {
            id: 1,
            kind: RoomKind::Dm,
            title: None,
            peer: Some(ProfilePayload {
                id: 8,
                nickname: Some("Seller".into()),
                avatar: None,
            }),
            member_count: 2,
            last: None,
            unread: 2,
        }])
    }

    async fn history(&self, _room_id: i64, _limit: u32) -> Result<Vec<HistoryItem>> {
        Ok(vec![HistoryItem {
            id: "100".into(),
            user_id: 8,
            text: "welcome".into(),
            kind: Default::default(),
            created_at: Some(Utc::now()),
            sender: None,
        }])
    }

    async fn create_room(&self, _request: &CreateRoomRequest) -> Result<CreateRoomResponse> {
        Ok(CreateRoomResponse { room_id: 1 })
    }

    async fn mark_read(&self, room_id: i64) -> Result<()> {
        self.read_calls.lock().unwrap().push(room_id);
        if self.fail_read {
            return Err(SyncError::Status {
                status: 500,
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
struct ChannelTransport {
    sent: Mutex<Vec<ClientCommand>>,
}

impl Transport for ChannelTransport {
    fn send(&self, command: ClientCommand) -> Result<()> {
        self.sent.lock().unwrap().push(command);
        Ok(())
    }

    fn close(&self) {}
}

async fn wait_for(
    rx: &mut watch::Receiver<Snapshot>,
    pred: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let snap = rx.borrow_and_update();
                if pred(&snap) {
                    return snap.clone();
                }
            }
            rx.changed().await.expect("sync task ended");
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

fn start(
    api: Arc<FakeApi>,
) -> (
    storechat_sync::SyncHandle,
    mpsc::UnboundedSender<TransportEvent>,
    Arc<ChannelTransport>,
    tokio::task::JoinHandle<()>,
) {
    let transport = Arc::new(ChannelTransport::default());
    let config = SyncConfig {
        user_id: Some(ME),
        ..SyncConfig::default()
    };
    let core = SyncCore::new(config, transport.clone());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (handle, task) = actor::spawn(core, api, events_rx);
    (handle, events_tx, transport, task)
}

#[tokio::test]
async fn open_loads_rooms_and_joins_them() {
    let (handle, events, transport, _task) = start(Arc::new(FakeApi::default()));
    let mut rx = handle.subscribe();

    events.send(TransportEvent::Open).unwrap();
    let snap = wait_for(&mut rx, |s| !s.threads.is_empty()).await;

    assert_eq!(snap.state, ConnectionState::Connected);
    assert_eq!(snap.threads[0].title, "Seller");
    assert_eq!(snap.threads[0].unread, 2);
    assert!(transport
        .sent
        .lock()
        .unwrap()
        .contains(&ClientCommand::Join { room_id: 1, user_id: ME }));
}

#[tokio::test]
async fn activating_a_room_fetches_history_and_acknowledges_read() {
    let api = Arc::new(FakeApi::default());
    let (handle, events, transport, _task) = start(api.clone());
    let mut rx = handle.subscribe();

    events.send(TransportEvent::Open).unwrap();
    wait_for(&mut rx, |s| !s.threads.is_empty()).await;

    handle.set_active_room(1).unwrap();
    let snap = wait_for(&mut rx, |s| s.messages.len() == 1).await;
    assert_eq!(snap.active_room, Some(1));
    assert_eq!(snap.messages[0].text, "welcome");
    assert_eq!(snap.threads[0].unread, 0);

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let broadcast = transport
                .sent
                .lock()
                .unwrap()
                .iter()
                .any(|c| matches!(c, ClientCommand::SendRead { room_id: 1, .. }));
            if broadcast {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("read broadcast never sent");
    assert_eq!(*api.read_calls.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn optimistic_send_then_echo() {
    let (handle, events, _transport, _task) = start(Arc::new(FakeApi::default()));
    let mut rx = handle.subscribe();

    events.send(TransportEvent::Open).unwrap();
    wait_for(&mut rx, |s| !s.threads.is_empty()).await;
    handle.set_active_room(1).unwrap();
    wait_for(&mut rx, |s| s.messages.len() == 1).await;

    handle.send_text(1, "hello").unwrap();
    let snap = wait_for(&mut rx, |s| s.messages.len() == 2).await;
    assert!(snap.messages[1].is_provisional());

    events
        .send(TransportEvent::Message(InboundMessage {
            id: Some("101".into()),
            room_id: 1,
            user_id: ME,
            kind: Default::default(),
            text: "hello".into(),
            created_at: Some(Utc::now()),
            sender: None,
        }))
        .unwrap();
    let snap = wait_for(&mut rx, |s| s.messages.iter().any(|m| m.id == "101")).await;
    assert_eq!(snap.messages.len(), 2);
    assert!(snap.messages.iter().all(|m| !m.is_provisional()));
}

#[tokio::test]
async fn failed_read_ack_resyncs_counts() {
    let api = Arc::new(FakeApi {
        fail_read: true,
        ..FakeApi::default()
    });
    let (handle, events, _transport, _task) = start(api.clone());
    let mut rx = handle.subscribe();

    events.send(TransportEvent::Open).unwrap();
    wait_for(&mut rx, |s| !s.threads.is_empty()).await;
    let loads = api.list_calls.load(Ordering::SeqCst);

    handle.mark_read(1).unwrap();
    // Zeroed locally, then restored by the server's view after the failure.
    let snap = wait_for(&mut rx, |s| {
        api.list_calls.load(Ordering::SeqCst) > loads && s.threads[0].unread == 2
    })
    .await;
    assert_eq!(snap.threads[0].unread, 2);
    assert_eq!(*api.read_calls.lock().unwrap(), vec![1]);
}

#[tokio::test]
async fn shutdown_stops_the_task() {
    let (handle, _events, _transport, task) = start(Arc::new(FakeApi::default()));
    let rx = handle.subscribe();

    handle.shutdown().unwrap();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("task did not stop")
        .unwrap();
    assert_eq!(rx.borrow().state, ConnectionState::Closed);
    assert!(handle.reload_rooms().is_err());
}

#[tokio::test]
async fn ended_event_stream_counts_as_disconnect() {
    let (handle, events, _transport, _task) = start(Arc::new(FakeApi::default()));
    let mut rx = handle.subscribe();

    events.send(TransportEvent::Open).unwrap();
    wait_for(&mut rx, |s| s.state == ConnectionState::Connected).await;
    drop(events);
    wait_for(&mut rx, |s| s.state == ConnectionState::Reconnecting).await;
}
