use storechat_types::events::{ClientCommand, InboundMessage, JoinedRoom, ReadReceipt, ServerEvent};

use crate::error::Result;

/// Outbound half of the gateway connection. Calls are fire-and-forget:
/// delivery problems show up later as `Close`/`Error` events, never as
/// failures of the operation that issued the command.
pub trait Transport: Send + Sync {
    fn send(&self, command: ClientCommand) -> Result<()>;

    fn close(&self);
}

/// Inbound half of the gateway connection, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A connection attempt is starting.
    Dialing,
    /// A new connection instance is up.
    Open,
    /// The current connection instance ended.
    Close,
    Error(String),
    Message(InboundMessage),
    Joined(JoinedRoom),
    Read(ReadReceipt),
}

impl From<ServerEvent> for TransportEvent {
    fn from(event: ServerEvent) -> Self {
        match event {
            ServerEvent::Message(m) => Self::Message(m),
            ServerEvent::Joined(j) => Self::Joined(j),
            ServerEvent::Read(r) => Self::Read(r),
        }
    }
}
