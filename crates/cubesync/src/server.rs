//! The authoritative server and its builder.
//!
//! The server owns the transport, the connection list and the registry.
//! Everything happens inside [`Server::update`], called once per frame:
//!
//! 1. reap connections closed during the previous frame (swap-remove),
//! 2. accept every pending connection and send it its identity,
//! 3. drain every pending event of every open connection,
//! 4. broadcast a snapshot if the broadcast cadence is due.

use std::time::Duration;

use cubesync_protocol::{Codec, Decoded, JsonCodec, Message, PlayerId, PlayerState};
use cubesync_session::{SessionError, SessionRegistry};
use cubesync_tick::Cadence;
use cubesync_transport::{
    ConnectionId, NetworkEvent, ServerTransport, WebSocketServer,
};
use tokio::time::Instant;

use crate::connection::ConnectionManager;
use crate::reconcile::{apply_player_update, build_snapshot};
use crate::{CubesyncError, ServerConfig};

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use cubesync::Server;
///
/// # async fn run() -> Result<(), cubesync::CubesyncError> {
/// let server = Server::builder()
///     .bind("0.0.0.0:9000")
///     .broadcast_interval(Duration::from_millis(100))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// A builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a loaded configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the WebSocket listener to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the snapshot broadcast interval.
    pub fn broadcast_interval(mut self, interval: Duration) -> Self {
        self.config.broadcast_interval = interval;
        self
    }

    /// Binds the WebSocket transport and builds the server.
    ///
    /// # Errors
    /// [`TransportError::BindFailed`](cubesync_transport::TransportError::BindFailed)
    /// if the address cannot be bound.
    pub async fn build(self) -> Result<Server<WebSocketServer>, CubesyncError> {
        let transport = WebSocketServer::bind(&self.config.bind_addr).await?;
        Ok(self.build_with(transport))
    }

    /// Builds the server over an already listening transport.
    pub fn build_with<T: ServerTransport>(self, transport: T) -> Server<T> {
        Server::with_codec(transport, JsonCodec, self.config.broadcast_interval)
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// An authoritative cubesync server.
pub struct Server<T: ServerTransport, C: Codec = JsonCodec> {
    transport: T,
    codec: C,
    connections: ConnectionManager,
    registry: SessionRegistry,
    broadcast: Cadence,
    /// Counter behind the `c1`, `c2`, … player identifiers.
    next_player: u64,
    phase: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    ShutDown,
}

impl Server<WebSocketServer> {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }
}

impl<T: ServerTransport> Server<T> {
    /// A JSON server over `transport` with the configured broadcast interval.
    pub fn new(transport: T, config: &ServerConfig) -> Self {
        Self::with_codec(transport, JsonCodec, config.broadcast_interval)
    }
}

impl<T: ServerTransport, C: Codec> Server<T, C> {
    pub fn with_codec(transport: T, codec: C, broadcast_interval: Duration) -> Self {
        Self {
            transport,
            codec,
            connections: ConnectionManager::new(),
            registry: SessionRegistry::new(),
            broadcast: Cadence::new(broadcast_interval),
            next_player: 0,
            phase: Phase::Idle,
        }
    }

    /// Runs one frame. The broadcast cadence starts on the first call.
    /// After [`shutdown`](Self::shutdown) this does nothing.
    pub fn update(&mut self, now: Instant) {
        match self.phase {
            Phase::ShutDown => return,
            Phase::Running => {}
            Phase::Idle => {
                self.phase = Phase::Running;
                self.broadcast.start(now);
                tracing::info!(
                    interval_ms = self.broadcast.interval().as_millis() as u64,
                    "server started"
                );
            }
        }

        self.reap_closed();
        self.accept_new();
        self.drain_events();

        if self.broadcast.fire(now) {
            self.broadcast_snapshot();
        }
    }

    /// Sends the current snapshot to every established connection right
    /// away, outside the cadence.
    pub fn broadcast_snapshot(&mut self) {
        let snapshot = build_snapshot(&self.registry);
        let bytes = match self.codec.encode_message(&snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode snapshot");
                return;
            }
        };

        let mut recipients = 0usize;
        for conn in self.connections.established() {
            match self.transport.send(conn.id(), &bytes) {
                Ok(()) => recipients += 1,
                // The liveness check reaps it on the next update.
                Err(e) => {
                    tracing::debug!(conn_id = %conn.id(), error = %e, "snapshot send failed");
                }
            }
        }
        tracing::trace!(
            players = self.registry.len(),
            recipients,
            "snapshot broadcast"
        );
    }

    /// Disconnects every client and empties the registry. Terminal: later
    /// calls to [`update`](Self::update) neither accept nor broadcast.
    pub fn shutdown(&mut self) {
        self.phase = Phase::ShutDown;
        let mut closed = 0usize;
        for mut conn in self.connections.drain() {
            if let Some(player_id) = conn.close() {
                let _ = self.registry.remove(&player_id);
            }
            self.transport.disconnect(conn.id());
            closed += 1;
        }
        self.broadcast.stop();
        tracing::info!(connections = closed, "server shut down");
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // -----------------------------------------------------------------------
    // Frame phases
    // -----------------------------------------------------------------------

    /// Closes connections the transport reports dead, then releases every
    /// closed connection.
    fn reap_closed(&mut self) {
        for conn in self.connections.iter_mut() {
            if !conn.is_closed() && !self.transport.is_alive(conn.id()) {
                let conn_id = conn.id();
                if let Some(player_id) = conn.close() {
                    let _ = self.registry.remove(&player_id);
                    tracing::info!(%conn_id, %player_id, "connection lost");
                }
            }
        }

        for conn in self.connections.reap_closed() {
            self.transport.disconnect(conn.id());
            tracing::debug!(conn_id = %conn.id(), "connection slot reclaimed");
        }
    }

    fn accept_new(&mut self) {
        while let Some(conn_id) = self.transport.accept() {
            self.next_player += 1;
            let player_id = PlayerId::new(format!("c{}", self.next_player));

            let sent = self
                .codec
                .encode_message(&Message::handshake(player_id.clone()))
                .map_err(CubesyncError::from)
                .and_then(|bytes| {
                    self.transport.send(conn_id, &bytes).map_err(CubesyncError::from)
                });

            let conn = self.connections.push(conn_id);
            if let Err(e) = sent {
                tracing::warn!(%conn_id, error = %e, "handshake send failed");
                conn.close();
                continue;
            }

            if let Err(e) = self.registry.create(PlayerState::new(player_id.clone())) {
                tracing::warn!(%conn_id, error = %e, "registry already had player");
            }
            conn.establish(player_id.clone());
            tracing::info!(%conn_id, %player_id, "accepted connection");
        }
    }

    fn drain_events(&mut self) {
        for index in 0..self.connections.len() {
            let Some(conn) = self.connections.get_mut(index) else {
                break;
            };
            if conn.is_closed() {
                continue;
            }
            let conn_id = conn.id();

            loop {
                match self.transport.pop_event(conn_id) {
                    NetworkEvent::Empty => break,
                    NetworkEvent::Data(bytes) => self.handle_data(conn_id, &bytes),
                    NetworkEvent::Disconnect => {
                        self.close_connection(index);
                        break;
                    }
                    NetworkEvent::Connect => {
                        tracing::debug!(%conn_id, "ignoring connect event");
                    }
                }
            }
        }
    }

    fn close_connection(&mut self, index: usize) {
        let Some(conn) = self.connections.get_mut(index) else {
            return;
        };
        let conn_id = conn.id();
        match conn.close() {
            Some(player_id) => {
                let _ = self.registry.remove(&player_id);
                tracing::info!(%conn_id, %player_id, "client disconnected");
            }
            None => tracing::info!(%conn_id, "client disconnected"),
        }
    }

    fn handle_data(&mut self, conn_id: ConnectionId, bytes: &[u8]) {
        let msg = match self.codec.decode_message(bytes) {
            Ok(Decoded::Message(msg)) => msg,
            Ok(Decoded::UnknownKind(kind)) => {
                tracing::warn!(%conn_id, %kind, "unrecognized message kind");
                return;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "dropping malformed message");
                return;
            }
        };

        match msg {
            Message::Handshake { id, .. } => {
                tracing::debug!(%conn_id, claimed = %id, "client handshake received");
            }
            Message::PlayerUpdate { player } => {
                match apply_player_update(&mut self.registry, &player) {
                    Ok(()) => {}
                    Err(SessionError::UnknownPlayer(player_id)) => {
                        tracing::debug!(%conn_id, %player_id, "update for unknown player dropped");
                    }
                    Err(e) => tracing::debug!(%conn_id, error = %e, "update dropped"),
                }
            }
            Message::ServerUpdate { .. } => {
                tracing::warn!(%conn_id, "unexpected SERVER_UPDATE from client");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubesync_protocol::{Color, Vec3};
    use std::collections::HashSet;

    use cubesync_transport::{ClientTransport, MemoryClient, MemoryNetwork, TransportError};

    const BROADCAST: Duration = Duration::from_millis(200);

    fn server() -> Server<MemoryNetwork> {
        Server::with_codec(MemoryNetwork::listen(), JsonCodec, BROADCAST)
    }

    /// Pops every queued message on a client, skipping the connect event.
    fn received(client: &mut MemoryClient) -> Vec<Message> {
        let mut out = Vec::new();
        loop {
            match client.pop_event() {
                NetworkEvent::Data(bytes) => {
                    match JsonCodec.decode_message(&bytes).unwrap() {
                        Decoded::Message(msg) => out.push(msg),
                        Decoded::UnknownKind(kind) => panic!("unknown {kind}"),
                    }
                }
                NetworkEvent::Connect => {}
                NetworkEvent::Disconnect | NetworkEvent::Empty => return out,
            }
        }
    }

    fn send(client: &mut MemoryClient, msg: &Message) {
        client.send(&JsonCodec.encode_message(msg).unwrap()).unwrap();
    }

    fn registry_ids(server: &Server<MemoryNetwork>) -> Vec<String> {
        server.registry().ids().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_accept_assigns_sequential_ids_and_sends_handshake() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let mut b = srv.transport().connect();

        srv.update(Instant::now());

        assert_eq!(received(&mut a), vec![Message::handshake(PlayerId::new("c1"))]);
        assert_eq!(received(&mut b), vec![Message::handshake(PlayerId::new("c2"))]);
        assert_eq!(registry_ids(&srv), ["c1", "c2"]);
        assert_eq!(srv.connections().established().count(), 2);
    }

    #[test]
    fn test_new_entry_is_zero_valued() {
        let mut srv = server();
        let _a = srv.transport().connect();
        srv.update(Instant::now());

        let entry = srv.registry().get(&PlayerId::new("c1")).unwrap();
        assert_eq!(entry.position, Vec3::ZERO);
        assert_eq!(entry.color, Color::default());
    }

    #[test]
    fn test_player_update_overwrites_entry() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);

        let update = PlayerState {
            id: PlayerId::new("c1"),
            position: Vec3::new(1.0, 0.0, 0.0),
            color: Color::RED,
        };
        send(&mut a, &Message::PlayerUpdate { player: update.clone() });
        srv.update(t0);

        assert_eq!(srv.registry().get(&update.id), Some(&update));
    }

    #[test]
    fn test_update_for_unknown_player_is_dropped() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);

        send(&mut a, &Message::PlayerUpdate {
            player: PlayerState::new(PlayerId::new("ghost")),
        });
        srv.update(t0);

        assert_eq!(registry_ids(&srv), ["c1"]);
        assert_eq!(srv.connections().established().count(), 1);
    }

    #[test]
    fn test_malformed_and_unknown_messages_keep_connection_open() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);

        a.send(b"{not json").unwrap();
        a.send(br#"{"cmd":"CHAT","text":"hi"}"#).unwrap();
        send(&mut a, &Message::ServerUpdate { players: vec![] });
        send(&mut a, &Message::handshake(PlayerId::new("c99")));
        srv.update(t0);

        assert_eq!(registry_ids(&srv), ["c1"]);
        assert!(srv.transport().is_alive(srv.connections().iter().next().unwrap().id()));
    }

    #[test]
    fn test_dead_connection_is_reaped_in_same_update() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let _b = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);

        a.disconnect();
        srv.update(t0);

        assert_eq!(registry_ids(&srv), ["c2"]);
        assert_eq!(srv.connections().len(), 1);
        assert_eq!(srv.transport().connection_count(), 1);
    }

    /// Reports every connection alive until its `Disconnect` event has been
    /// popped, like a socket whose close is only learned by reading.
    struct LateNotice {
        net: MemoryNetwork,
        gone: HashSet<ConnectionId>,
    }

    impl ServerTransport for LateNotice {
        fn accept(&mut self) -> Option<ConnectionId> {
            self.net.accept()
        }

        fn send(&mut self, conn: ConnectionId, data: &[u8]) -> Result<(), TransportError> {
            self.net.send(conn, data)
        }

        fn pop_event(&mut self, conn: ConnectionId) -> NetworkEvent {
            let event = self.net.pop_event(conn);
            if event == NetworkEvent::Disconnect {
                self.gone.insert(conn);
            }
            event
        }

        fn is_alive(&self, conn: ConnectionId) -> bool {
            !self.gone.contains(&conn)
        }

        fn disconnect(&mut self, conn: ConnectionId) {
            self.net.disconnect(conn);
        }
    }

    #[test]
    fn test_disconnect_event_removes_entry_then_slot_next_update() {
        let transport = LateNotice {
            net: MemoryNetwork::listen(),
            gone: HashSet::new(),
        };
        let mut srv = Server::with_codec(transport, JsonCodec, BROADCAST);
        let mut a = srv.transport().net.connect();
        let _b = srv.transport().net.connect();
        let t0 = Instant::now();
        srv.update(t0);

        a.disconnect();
        srv.update(t0);
        let closed: Vec<_> = srv.connections().iter().filter(|c| c.is_closed()).collect();
        assert_eq!(closed.len(), 1);
        assert_eq!(srv.registry().ids().collect::<Vec<_>>(), [&PlayerId::new("c2")]);
        assert_eq!(srv.connections().len(), 2);

        srv.update(t0);
        assert_eq!(srv.connections().len(), 1);
        assert_eq!(srv.transport().net.connection_count(), 1);
    }

    #[test]
    fn test_broadcast_fires_on_cadence() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);
        received(&mut a); // handshake

        srv.update(t0 + BROADCAST - Duration::from_millis(1));
        assert!(received(&mut a).is_empty());

        srv.update(t0 + BROADCAST);
        let msgs = received(&mut a);
        assert_eq!(msgs.len(), 1);
        let Message::ServerUpdate { players } = &msgs[0] else {
            panic!("expected SERVER_UPDATE");
        };
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].id, PlayerId::new("c1"));
    }

    #[test]
    fn test_broadcast_omits_departed_player() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        let mut b = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);
        received(&mut b);

        a.disconnect();
        srv.update(t0 + BROADCAST);

        let msgs = received(&mut b);
        assert_eq!(msgs, vec![Message::ServerUpdate {
            players: vec![PlayerState::new(PlayerId::new("c2"))],
        }]);

        b.disconnect();
        srv.update(t0 + BROADCAST * 2);
        assert!(srv.registry().is_empty());
    }

    #[test]
    fn test_shutdown_disconnects_everyone() {
        let mut srv = server();
        let mut a = srv.transport().connect();
        srv.update(Instant::now());

        srv.shutdown();

        assert!(srv.registry().is_empty());
        assert!(srv.connections().is_empty());
        received(&mut a);
        assert!(!a.is_alive());
    }

    #[test]
    fn test_update_after_shutdown_does_nothing() {
        let mut srv = server();
        let _a = srv.transport().connect();
        let t0 = Instant::now();
        srv.update(t0);
        srv.shutdown();

        let mut late = srv.transport().connect();
        srv.update(t0 + BROADCAST);

        assert!(srv.connections().is_empty());
        assert!(srv.registry().is_empty());
        assert_eq!(srv.transport().connection_count(), 0);
        assert!(received(&mut late).is_empty());
        assert!(!srv.broadcast.is_running());
    }
}
