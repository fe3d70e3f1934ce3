//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each connection gets a reader task and a writer task. The reader pushes
//! [`NetworkEvent`]s into the connection's inbox; the writer drains an
//! outbound queue. One application message is one binary frame.

use std::collections::HashMap;
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::inbox::Inbox;
use crate::{
    ClientTransport, ConnectionId, NetworkEvent, ServerTransport,
    TransportError, next_connection_id,
};

enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

struct WsPeer {
    inbox: Inbox,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    addr: SocketAddr,
}

impl WsPeer {
    fn is_alive(&self) -> bool {
        !self.inbox.is_closed() && !self.outgoing.is_closed()
    }
}

/// A WebSocket [`ServerTransport`] listening on a TCP address.
///
/// Connections whose WebSocket handshake completed are queued until the
/// next [`accept`](ServerTransport::accept). Dropping the server stops
/// listening.
pub struct WebSocketServer {
    local_addr: SocketAddr,
    pending: mpsc::UnboundedReceiver<(ConnectionId, WsPeer)>,
    peers: HashMap<ConnectionId, WsPeer>,
    accept_task: JoinHandle<()>,
}

impl WebSocketServer {
    /// Binds a new WebSocket server to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let bind_failed = |source| TransportError::BindFailed {
            addr: addr.to_string(),
            source,
        };
        let listener = TcpListener::bind(addr).await.map_err(bind_failed)?;
        let local_addr = listener.local_addr().map_err(bind_failed)?;
        tracing::info!(%local_addr, "WebSocket transport listening");

        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, pending_tx));

        Ok(Self {
            local_addr,
            pending: pending_rx,
            peers: HashMap::new(),
            accept_task,
        })
    }

    /// The address actually bound. Useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote address of an accepted connection.
    pub fn peer_addr(&self, conn: ConnectionId) -> Option<SocketAddr> {
        self.peers.get(&conn).map(|peer| peer.addr)
    }
}

impl Drop for WebSocketServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl ServerTransport for WebSocketServer {
    fn accept(&mut self) -> Option<ConnectionId> {
        let (id, peer) = self.pending.try_recv().ok()?;
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
        if !peer.is_alive() {
            return Err(TransportError::ConnectionClosed(conn.to_string()));
        }
        peer.outgoing
            .send(Outgoing::Frame(data.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed(conn.to_string()))
    }

    fn pop_event(&mut self, conn: ConnectionId) -> NetworkEvent {
        match self.peers.get_mut(&conn) {
            Some(peer) => peer.inbox.pop(),
            None => NetworkEvent::Empty,
        }
    }

    fn is_alive(&self, conn: ConnectionId) -> bool {
        self.peers.get(&conn).is_some_and(WsPeer::is_alive)
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        if let Some(peer) = self.peers.remove(&conn) {
            let _ = peer.outgoing.send(Outgoing::Close);
            tracing::debug!(%conn, addr = %peer.addr, "closed WebSocket connection");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    pending: mpsc::UnboundedSender<(ConnectionId, WsPeer)>,
) {
    loop {
        let (stream, addr) = tokio::select! {
            _ = pending.closed() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "TCP accept failed");
                    continue;
                }
            },
        };

        let pending = pending.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let id = next_connection_id();
                    let (events_tx, events_rx) = mpsc::unbounded_channel();
                    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
                    pump(ws, events_tx, outgoing_rx);
                    tracing::debug!(%id, %addr, "accepted WebSocket connection");
                    let peer = WsPeer {
                        inbox: Inbox::new(events_rx),
                        outgoing: outgoing_tx,
                        addr,
                    };
                    let _ = pending.send((id, peer));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
                }
            }
        });
    }
}

/// Spawns the reader and writer tasks for one established socket.
///
/// The reader always finishes by pushing `Disconnect`, whatever ended it.
fn pump<S>(
    ws: WebSocketStream<S>,
    events: mpsc::UnboundedSender<NetworkEvent>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();

    tokio::spawn(async move {
        while let Some(out) = outgoing.recv().await {
            match out {
                Outgoing::Frame(data) => {
                    if let Err(e) = sink.send(Message::Binary(data.into())).await {
                        tracing::debug!(error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Outgoing::Close => {
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let data: Vec<u8> = match msg {
                Ok(Message::Binary(data)) => data.into(),
                Ok(Message::Text(text)) => text.as_bytes().to_vec(),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue, // ping/pong/frame
                Err(e) => {
                    tracing::debug!(error = %e, "WebSocket receive failed");
                    break;
                }
            };
            if events.send(NetworkEvent::Data(data)).is_err() {
                return;
            }
        }
        let _ = events.send(NetworkEvent::Disconnect);
    });
}

/// A WebSocket [`ClientTransport`].
///
/// Connecting happens in the background; the first popped event is
/// `Connect` on success or `Disconnect` on failure. Messages sent before
/// the socket is open are buffered and flushed once it is.
pub struct WebSocketClient {
    url: String,
    inbox: Inbox,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    open: bool,
}

impl WebSocketClient {
    /// Starts connecting to `url` (e.g. `ws://127.0.0.1:9000`).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(url: impl Into<String>) -> Self {
        let url = url.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        let target = url.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::connect_async(target.as_str()).await {
                Ok((ws, _response)) => {
                    tracing::debug!(url = %target, "WebSocket connected");
                    if events_tx.send(NetworkEvent::Connect).is_ok() {
                        pump(ws, events_tx, outgoing_rx);
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %target, error = %e, "WebSocket connect failed");
                    let _ = events_tx.send(NetworkEvent::Disconnect);
                }
            }
        });

        Self {
            url,
            inbox: Inbox::new(events_rx),
            outgoing: outgoing_tx,
            open: true,
        }
    }

    /// The URL this client was asked to connect to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ClientTransport for WebSocketClient {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::ConnectionClosed(self.url.clone()));
        }
        self.outgoing
            .send(Outgoing::Frame(data.to_vec()))
            .map_err(|_| TransportError::ConnectionClosed(self.url.clone()))
    }

    fn pop_event(&mut self) -> NetworkEvent {
        self.inbox.pop()
    }

    fn is_alive(&self) -> bool {
        self.open && !self.inbox.is_closed() && !self.outgoing.is_closed()
    }

    fn disconnect(&mut self) {
        if self.open {
            self.open = false;
            let _ = self.outgoing.send(Outgoing::Close);
            self.inbox.close();
            tracing::debug!(url = %self.url, "WebSocket client disconnected");
        }
    }
}
