use std::collections::HashSet;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use storechat_sync::actor::{self, Command, Snapshot, SyncHandle};
use storechat_sync::http::HttpRoomsApi;
use storechat_sync::profile::ProfilePatch;
use storechat_sync::{SyncConfig, SyncCore, ws};
use storechat_types::api::RoomKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storechat=debug".into()),
        )
        .init();

    // Config
    let config = SyncConfig::from_env()?;
    let Some(user_id) = config.user_id else {
        anyhow::bail!("STORECHAT_USER_ID must be set");
    };
    let nickname = std::env::var("STORECHAT_NICKNAME")
        .ok()
        .filter(|n| !n.trim().is_empty());

    info!("Chatting as user {} via {}", user_id, config.gateway_url);

    // Wire adapters
    let api = Arc::new(HttpRoomsApi::from_config(&config));
    let (transport, events, ws_task) = ws::connect_with_config(&config);
    let core = SyncCore::new(config, Arc::new(transport));
    let (handle, sync_task) = actor::spawn(core, api, events);

    if let Some(nickname) = nickname {
        handle.send(Command::SetIdentity {
            user_id,
            patch: ProfilePatch::nickname(nickname),
        })?;
    }

    tokio::spawn(render(handle.subscribe()));

    run_console(&handle).await?;

    handle.shutdown()?;
    let _ = sync_task.await;
    let _ = ws_task.await;
    Ok(())
}

async fn run_console(handle: &SyncHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, arg) = line.split_once(' ').unwrap_or((line, ""));
        match cmd {
            "/quit" => break,
            "/rooms" => {
                print_rooms(&handle.snapshot());
                handle.reload_rooms()?;
            }
            "/open" => match arg.trim().parse() {
                Ok(room_id) => handle.set_active_room(room_id)?,
                Err(_) => println!("usage: /open <roomId>"),
            },
            "/dm" => match arg.trim().parse() {
                Ok(peer) => handle.open_room(RoomKind::Dm, vec![peer], None)?,
                Err(_) => println!("usage: /dm <userId>"),
            },
            "/read" => match handle.snapshot().active_room {
                Some(room_id) => handle.mark_read(room_id)?,
                None => println!("no room open"),
            },
            _ if cmd.starts_with('/') => println!("unknown command {}", cmd),
            _ => match handle.snapshot().active_room {
                Some(room_id) => handle.send_text(room_id, line)?,
                None => println!("no room open, use /open <roomId>"),
            },
        }
    }
    Ok(())
}

fn print_rooms(snapshot: &Snapshot) {
    if snapshot.threads.is_empty() {
        println!("(no rooms)");
        return;
    }
    for thread in &snapshot.threads {
        let marker = if snapshot.active_room == Some(thread.id) { '*' } else { ' ' };
        let unread = if thread.unread > 0 {
            format!(" [{}]", thread.unread)
        } else {
            String::new()
        };
        println!(
            "{}{:>6}  {:<20} {:>10}{}  {}",
            marker, thread.id, thread.title, thread.time, unread, thread.last_message
        );
    }
}

/// Print connection changes and new messages of the active room.
async fn render(mut snapshots: watch::Receiver<Snapshot>) {
    let mut state = None;
    let mut room = None;
    let mut printed: HashSet<String> = HashSet::new();
    // Provisional messages already shown, by id, with their text.
    let mut pending: Vec<(String, String)> = Vec::new();

    loop {
        {
            let snap = snapshots.borrow_and_update();
            if state != Some(snap.state) {
                state = Some(snap.state);
                println!("-- {:?}", snap.state);
            }
            if room != snap.active_room {
                room = snap.active_room;
                printed.clear();
                pending.clear();
                if let Some(id) = room {
                    println!("-- room {}", id);
                }
            }

            let (resolved, still_pending): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|(id, _)| !snap.messages.iter().any(|m| &m.id == id));
            pending = still_pending;
            let mut resolved: Vec<String> = resolved.into_iter().map(|(_, text)| text).collect();

            for msg in &snap.messages {
                if !printed.insert(msg.id.clone()) {
                    continue;
                }
                if msg.is_provisional() {
                    pending.push((msg.id.clone(), msg.text.clone()));
                } else if let Some(idx) = resolved.iter().position(|text| *text == msg.text) {
                    // Confirmed echo of a line already shown as sending.
                    resolved.remove(idx);
                    continue;
                }
                let marker = if msg.is_provisional() { " (sending)" } else { "" };
                println!(
                    "[{}] {}: {}{}",
                    msg.created_at.format("%H:%M"),
                    msg.sender.nickname,
                    msg.preview(),
                    marker
                );
            }
        }
        if snapshots.changed().await.is_err() {
            warn!("Sync task gone, renderer stopping");
            return;
        }
    }
}
