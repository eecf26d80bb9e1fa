//! Gateway transport over a WebSocket.
//!
//! Frames are JSON `{"type": ..., "data": ...}` in both directions. The
//! connection task redials after `reconnect_delay` whenever the socket ends,
//! emitting `Close` for the old connection, then `Dialing` and `Open` for the
//! new one.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use storechat_types::events::{ClientCommand, ServerEvent};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::transport::{Transport, TransportEvent};

/// Ping interval. Two consecutive missed pongs (~30s) drop the socket.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug)]
enum Outbound {
    Command(ClientCommand),
    Close,
}

/// Outbound handle for a running gateway connection task.
#[derive(Clone)]
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Transport for WsTransport {
    fn send(&self, command: ClientCommand) -> Result<()> {
        self.outbound
            .send(Outbound::Command(command))
            .map_err(|_| SyncError::ChannelClosed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// Start the connection task for `url`. Events for the sync core come out
/// of the returned receiver; the task ends after [`Transport::close`].
pub fn connect(
    url: impl Into<String>,
    token: Option<String>,
    reconnect_delay: Duration,
) -> (WsTransport, mpsc::UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(run_connection(
        url.into(),
        token,
        reconnect_delay,
        outbound_rx,
        events_tx,
    ));

    (
        WsTransport {
            outbound: outbound_tx,
        },
        events_rx,
        task,
    )
}

pub fn connect_with_config(
    config: &SyncConfig,
) -> (WsTransport, mpsc::UnboundedReceiver<TransportEvent>, JoinHandle<()>) {
    connect(
        config.gateway_url.clone(),
        config.token.clone(),
        config.reconnect_delay,
    )
}

fn build_request(url: &str, token: Option<&str>) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SyncError::Transport(format!("invalid gateway url {}: {}", url, e)))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| SyncError::Transport(format!("invalid token: {}", e)))?;
        request.headers_mut().insert("Authorization", value);
    }
    Ok(request)
}

async fn run_connection(
    url: String,
    token: Option<String>,
    reconnect_delay: Duration,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    loop {
        if events.send(TransportEvent::Dialing).is_err() {
            return;
        }
        let request = match build_request(&url, token.as_deref()) {
            Ok(request) => request,
            Err(e) => {
                warn!("{}", e);
                let _ = events.send(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        match connect_async(request).await {
            Ok((socket, _)) => {
                // Anything queued while dialing belongs to the old connection.
                if drain_stale(&mut outbound) {
                    return;
                }
                info!("Connected to gateway {}", url);
                if events.send(TransportEvent::Open).is_err() {
                    return;
                }
                let closed_by_us = run_session(socket, &mut outbound, &events).await;
                info!("Disconnected from gateway {}", url);
                let _ = events.send(TransportEvent::Close);
                if closed_by_us {
                    return;
                }
            }
            Err(e) => {
                warn!("Gateway connect to {} failed: {}", url, e);
                if events.send(TransportEvent::Error(e.to_string())).is_err() {
                    return;
                }
            }
        }

        if wait_before_redial(reconnect_delay, &mut outbound).await {
            return;
        }
    }
}

/// Discard queued commands. Returns true if a close was requested.
fn drain_stale(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> bool {
    let mut dropped = 0usize;
    while let Ok(msg) = outbound.try_recv() {
        match msg {
            Outbound::Command(_) => dropped += 1,
            Outbound::Close => return true,
        }
    }
    if dropped > 0 {
        debug!("Dropped {} commands queued while disconnected", dropped);
    }
    false
}

/// Sleep out the reconnect delay. Returns true if a close was requested.
async fn wait_before_redial(
    delay: Duration,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            msg = outbound.recv() => match msg {
                Some(Outbound::Command(cmd)) => {
                    debug!("Dropping {:?} while disconnected", cmd);
                }
                Some(Outbound::Close) | None => return true,
            },
        }
    }
}

/// Pump one socket until it ends. Returns true if we closed it on request.
async fn run_session(
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> bool {
    let (mut sink, mut stream) = socket.split();

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut pong_received = true;
    let mut missed_heartbeats: u8 = 0;

    loop {
        tokio::select! {
            msg = outbound.recv() => match msg {
                Some(Outbound::Command(cmd)) => {
                    let text = match serde_json::to_string(&cmd) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Unencodable command for room {}: {}", cmd.room_id(), e);
                            continue;
                        }
                    };
                    trace!("-> {}", text);
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        return false;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return true;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(text.as_str(), events),
                Some(Ok(Message::Pong(_))) => pong_received = true,
                Some(Ok(Message::Close(_))) | None => return false,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Gateway read error: {}", e);
                    return false;
                }
            },
            _ = heartbeat.tick() => {
                if std::mem::replace(&mut pong_received, false) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!(
                            "Heartbeat timeout (missed {} pongs), dropping connection",
                            missed_heartbeats
                        );
                        return false;
                    }
                }
                if sink.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    return false;
                }
            }
        }
    }
}

fn handle_text(text: &str, events: &mpsc::UnboundedSender<TransportEvent>) {
    trace!("<- {}", text);
    match ServerEvent::decode(text) {
        Ok(Some(event)) => {
            let _ = events.send(event.into());
        }
        Ok(None) => trace!("Ignoring frame"),
        Err(e) => warn!(
            "Bad gateway frame: {} -- raw: {}",
            e,
            text.chars().take(200).collect::<String>()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_bearer_token() {
        let request = build_request("ws://127.0.0.1:3000/gateway", Some("abc")).unwrap();
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "Bearer abc"
        );
        let request = build_request("ws://127.0.0.1:3000/gateway", None).unwrap();
        assert!(request.headers().get("Authorization").is_none());
    }

    #[test]
    fn bad_url_is_transport_error() {
        assert!(matches!(
            build_request("not a url", None),
            Err(SyncError::Transport(_))
        ));
    }
}
