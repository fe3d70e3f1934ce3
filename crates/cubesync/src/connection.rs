//! Server-side connection tracking.
//!
//! A [`Connection`] pairs the transport's [`ConnectionId`] with the
//! [`PlayerId`] the server assigned to it. The two are distinct: the
//! connection ID never leaves the process, the player ID is what clients
//! see. They are joined exactly once, when the connection is established.
//!
//! ```text
//! accept ──→ [Pending] ──handshake sent──→ [Established]
//!                │                               │
//!                └──────── send failed ──────────┤
//!                                                ▼
//!                            disconnect event / liveness check
//!                                                │
//!                                                ▼
//!                                           [Closed] ──→ reap (swap-remove)
//! ```

use cubesync_protocol::PlayerId;
use cubesync_transport::ConnectionId;

/// Lifecycle state of a server-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted by the transport, handshake not yet sent.
    Pending,
    /// Handshake sent; the player has a registry entry.
    Established,
    /// Gone. Waiting to be reaped at the start of the next update.
    Closed,
}

/// One accepted connection.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    player_id: Option<PlayerId>,
}

impl Connection {
    /// A freshly accepted, pending connection.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnectionState::Pending,
            player_id: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The assigned player, once established.
    pub fn player_id(&self) -> Option<&PlayerId> {
        self.player_id.as_ref()
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// `Pending → Established`. The player assignment is one-time: a
    /// connection that is not pending is left untouched.
    pub(crate) fn establish(&mut self, player_id: PlayerId) -> bool {
        if self.state != ConnectionState::Pending {
            return false;
        }
        self.player_id = Some(player_id);
        self.state = ConnectionState::Established;
        true
    }

    /// `* → Closed`. Returns the player that was established on this
    /// connection, if any, the first time only.
    pub(crate) fn close(&mut self) -> Option<PlayerId> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        let was_established = self.state == ConnectionState::Established;
        self.state = ConnectionState::Closed;
        if was_established {
            self.player_id.clone()
        } else {
            None
        }
    }
}

/// Unordered collection of the server's connections.
///
/// Closed connections are removed with swap-remove, so the order among the
/// remaining ones is not preserved.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: Vec<Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks a newly accepted connection and returns it.
    pub(crate) fn push(&mut self, id: ConnectionId) -> &mut Connection {
        let index = self.connections.len();
        self.connections.push(Connection::new(id));
        &mut self.connections[index]
    }

    /// Removes every closed connection and returns them.
    pub(crate) fn reap_closed(&mut self) -> Vec<Connection> {
        let mut reaped = Vec::new();
        let mut i = 0;
        while i < self.connections.len() {
            if self.connections[i].is_closed() {
                reaped.push(self.connections.swap_remove(i));
            } else {
                i += 1;
            }
        }
        reaped
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut Connection> {
        self.connections.get_mut(index)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.iter_mut()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, Connection> {
        self.connections.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    /// Connections that completed the handshake.
    pub fn established(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.is_established())
    }

    /// Number of tracked connections, including closed ones not yet reaped.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
