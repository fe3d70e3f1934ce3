//! Transport abstraction layer for cubesync.
//!
//! The synchronization core never awaits the network. Once per frame it asks
//! the transport for newly accepted connections and pops every pending
//! [`NetworkEvent`] until it sees [`NetworkEvent::Empty`]. Sends are queued
//! and never block the caller beyond buffering. Whatever I/O the
//! implementation needs runs on its own Tokio tasks.
//!
//! ```text
//! I/O tasks ──(events)──→ inbox ──pop_event()──→ core
//! core ──send()──→ outbound queue ──→ I/O tasks
//! ```
//!
//! # Implementations
//!
//! - [`MemoryNetwork`] / [`MemoryClient`]: in-process loopback, no sockets
//! - [`WebSocketServer`] / [`WebSocketClient`]: binary WebSocket frames
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

mod error;
mod inbox;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryClient, MemoryConnector, MemoryNetwork};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketClient, WebSocketServer};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs, shared by every transport
/// in the process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> ConnectionId {
    ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Opaque identifier the transport assigns to a connection.
///
/// This is a transport concept only. It is never sent on the wire and is
/// not the player's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One event popped from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    /// The connection is established (client side).
    Connect,
    /// One complete message from the peer.
    Data(Vec<u8>),
    /// The connection is gone. Reported once; every later pop is `Empty`.
    Disconnect,
    /// Nothing is pending right now.
    Empty,
}

/// Listening side of a transport.
///
/// Binding and listening happen in the implementation's constructor, so a
/// value of this type is always ready to accept.
pub trait ServerTransport {
    /// Takes the next connection that completed its transport handshake,
    /// or `None` if no connection is waiting.
    fn accept(&mut self) -> Option<ConnectionId>;

    /// Queues one message for the given connection.
    fn send(
        &mut self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError>;

    /// Pops the next pending event for the given connection.
    ///
    /// Unknown connections report `Empty`.
    fn pop_event(&mut self, conn: ConnectionId) -> NetworkEvent;

    /// Returns `true` while the connection can still carry traffic.
    fn is_alive(&self, conn: ConnectionId) -> bool;

    /// Closes the connection and releases its resources. Idempotent.
    fn disconnect(&mut self, conn: ConnectionId);
}

/// Connecting side of a transport: a single connection to one server.
///
/// The first event of a successful connection is [`NetworkEvent::Connect`].
pub trait ClientTransport {
    /// Queues one message for the server.
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Pops the next pending event.
    fn pop_event(&mut self) -> NetworkEvent;

    /// Returns `true` while the connection is pending or open.
    fn is_alive(&self) -> bool;

    /// Closes the connection. Idempotent.
    fn disconnect(&mut self);
}
