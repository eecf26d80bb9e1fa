use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use storechat_sync::ws;
use storechat_sync::{Transport, TransportEvent};
use storechat_types::events::ClientCommand;

async fn next_event(events: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport task ended")
}

#[tokio::test]
async fn frames_flow_both_ways() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (server_tx, mut server_rx) = mpsc::unbounded_channel::<String>();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Wait for the join, then push a message for that room.
        while let Some(Ok(frame)) = socket.next().await {
            if let Message::Text(text) = frame {
                server_tx.send(text.as_str().to_string()).unwrap();
                break;
            }
        }
        let push = r#"{"type":"message","data":{"id":55,"roomId":"3","userId":8,"text":"restocked","createdAt":"2024-05-01T10:00:00Z"}}"#;
        socket.send(Message::Text(push.into())).await.unwrap();
        let _ = socket.next().await;
    });

    let (transport, mut events, task) = ws::connect(
        format!("ws://{}/gateway", addr),
        Some("secret".into()),
        Duration::from_millis(50),
    );

    assert!(matches!(next_event(&mut events).await, TransportEvent::Dialing));
    assert!(matches!(next_event(&mut events).await, TransportEvent::Open));

    transport
        .send(ClientCommand::Join { room_id: 3, user_id: 7 })
        .unwrap();
    let join = tokio::time::timeout(Duration::from_secs(2), server_rx.recv())
        .await
        .unwrap()
        .unwrap();
    let join: serde_json::Value = serde_json::from_str(&join).unwrap();
    assert_eq!(join["type"], "join");
    assert_eq!(join["data"]["roomId"], 3);
    assert_eq!(join["data"]["userId"], 7);

    match next_event(&mut events).await {
        TransportEvent::Message(msg) => {
            assert_eq!(msg.id.as_deref(), Some("55"));
            assert_eq!(msg.room_id, 3);
            assert_eq!(msg.user_id, 8);
            assert_eq!(msg.text, "restocked");
        }
        other => panic!("expected message, got {:?}", other),
    }

    transport.close();
    assert!(matches!(next_event(&mut events).await, TransportEvent::Close));
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn unreachable_gateway_reports_errors_until_closed() {
    // Bind then drop to get a port nobody listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let (transport, mut events, task) =
        ws::connect(format!("ws://{}/gateway", addr), None, Duration::from_millis(20));

    // Every redial announces itself before failing.
    for _ in 0..2 {
        assert!(matches!(next_event(&mut events).await, TransportEvent::Dialing));
        assert!(matches!(next_event(&mut events).await, TransportEvent::Error(_)));
    }

    transport.close();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
