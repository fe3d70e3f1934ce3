//! In-process loopback transport.
//!
//! Every connection is a pair of unbounded Tokio channels, one per direction.
//! Nothing here needs a running runtime: `send` and `try_recv` on unbounded
//! channels are synchronous. Servers and clients in the same process (tests,
//! local simulations) talk through this exactly as they would over sockets.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::inbox::Inbox;
use crate::{
    ClientTransport, ConnectionId, NetworkEvent, ServerTransport,
    TransportError, next_connection_id,
};

type PendingSender = mpsc::UnboundedSender<(ConnectionId, MemoryPeer)>;

/// The server's half of one in-memory connection.
struct MemoryPeer {
    inbox: Inbox,
    outbound: mpsc::UnboundedSender<NetworkEvent>,
}

impl MemoryPeer {
    fn is_alive(&self) -> bool {
        !self.inbox.is_closed() && !self.outbound.is_closed()
    }
}

/// Listening side of the in-memory transport.
///
/// ```rust
/// use cubesync_transport::{ClientTransport, MemoryNetwork, NetworkEvent, ServerTransport};
///
/// let mut server = MemoryNetwork::listen();
/// let mut client = server.connect();
///
/// let conn = server.accept().expect("pending connection");
/// server.send(conn, b"hi").unwrap();
///
/// assert_eq!(client.pop_event(), NetworkEvent::Connect);
/// assert_eq!(client.pop_event(), NetworkEvent::Data(b"hi".to_vec()));
/// ```
pub struct MemoryNetwork {
    pending: mpsc::UnboundedReceiver<(ConnectionId, MemoryPeer)>,
    connector: MemoryConnector,
    peers: HashMap<ConnectionId, MemoryPeer>,
}

impl MemoryNetwork {
    /// Creates a listening in-memory network.
    pub fn listen() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pending: rx,
            connector: MemoryConnector { pending: tx },
            peers: HashMap::new(),
        }
    }

    /// Returns a handle that clients use to connect to this network.
    pub fn connector(&self) -> MemoryConnector {
        self.connector.clone()
    }

    /// Shorthand for `self.connector().connect()`.
    pub fn connect(&self) -> MemoryClient {
        self.connector.connect()
    }

    /// Number of accepted connections that have not been released.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }
}

impl ServerTransport for MemoryNetwork {
    fn accept(&mut self) -> Option<ConnectionId> {
        let (id, peer) = self.pending.try_recv().ok()?;
        tracing::debug!(%id, "accepted in-memory connection");
        self.peers.insert(id, peer);
        Some(id)
    }

    fn send(
        &mut self,
        conn: ConnectionId,
        data: &[u8],
    ) -> Result<(), TransportError> {
        let peer = self
            .peers
            .get(&conn)
            .ok_or(TransportError::UnknownConnection(conn))?;
        if peer.inbox.is_closed() {
            return Err(TransportError::ConnectionClosed(conn.to_string()));
        }
        peer.outbound
            .send(NetworkEvent::Data(data.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed(conn.to_string()))
    }

    fn pop_event(&mut self, conn: ConnectionId) -> NetworkEvent {
        match self.peers.get_mut(&conn) {
            Some(peer) => peer.inbox.pop(),
            None => NetworkEvent::Empty,
        }
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        self.peers.get(&conn).is_some_and(MemoryPeer::is_alive)
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if let Some(peer) = self.peers.remove(&conn) {
            if !peer.inbox.is_closed() {
                let _ = peer.outbound.send(NetworkEvent::Disconnect);
            }
            tracing::debug!(%conn, "released in-memory connection");
        }
    }
}

/// Cloneable handle for opening connections to a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryConnector {
    pending: PendingSender,
}

impl MemoryConnector {
    /// Opens a connection. The client's first event is `Connect`, or
    /// `Connect` followed by `Disconnect` if the network is gone.
    pub fn connect(&self) -> MemoryClient {
        let id = next_connection_id();
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

        let _ = to_client_tx.send(NetworkEvent::Connect);

        let peer = MemoryPeer {
            inbox: Inbox::new(to_server_rx),
            outbound: to_client_tx.clone(),
        };
        if self.pending.send((id, peer)).is_err() {
            tracing::debug!(%id, "in-memory network is gone");
            let _ = to_client_tx.send(NetworkEvent::Disconnect);
        }

        MemoryClient {
            id,
            inbox: Inbox::new(to_client_rx),
            outbound: to_server_tx,
            open: true,
        }
    }
}

/// Client half of an in-memory connection.
///
/// Dropping it without calling `disconnect` is reported to the server as a
/// disconnect.
pub struct MemoryClient {
    id: ConnectionId,
    inbox: Inbox,
    outbound: mpsc::UnboundedSender<NetworkEvent>,
    open: bool,
}

impl MemoryClient {
    /// The transport ID shared with the server side of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl ClientTransport for MemoryClient {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        self.outbound
            .send(NetworkEvent::Data(data.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    fn pop_event(&mut self) -> NetworkEvent {
        self.inbox.pop()
    }

    fn is_alive(&self) -> bool {
        self.open && !self.inbox.is_closed() && !self.outbound.is_closed()
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.outbound.send(NetworkEvent::Disconnect);
            self.inbox.close();
        }
    }
}
