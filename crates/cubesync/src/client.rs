//! The client driver.
//!
//! A client holds one connection to the server and a [`Mirror`] of every
//! player. [`Client::update`] runs once per frame: it drains every pending
//! transport event, then polls its cadences.
//!
//! ```text
//! Connect ──→ send HANDSHAKE(placeholder, initial color)
//! HANDSHAKE reply ──→ adopt identity ──→ start report / drop-check / recolor
//! SERVER_UPDATE ──→ merge into mirror
//! Disconnect ──→ forget identity ──→ stop cadences
//! ```

use cubesync_protocol::{Codec, Color, Decoded, JsonCodec, Message, PlayerId, Vec3};
use cubesync_session::SessionRegistry;
use cubesync_tick::Cadence;
use cubesync_transport::{ClientTransport, NetworkEvent, WebSocketClient};
use rand::Rng;
use tokio::time::Instant;

use crate::ClientConfig;
use crate::reconcile::Mirror;
use crate::render::Renderer;

/// A cubesync client.
pub struct Client<T: ClientTransport, R: Renderer, C: Codec = JsonCodec> {
    transport: T,
    codec: C,
    mirror: Mirror<R>,
    initial_color: Color,
    report: Cadence,
    drop_check: Cadence,
    recolor: Option<Cadence>,
    connected: bool,
}

impl<R: Renderer> Client<WebSocketClient, R> {
    /// Starts connecting to `config.server_url` over WebSocket.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(config: &ClientConfig, renderer: R) -> Self {
        let transport = WebSocketClient::connect(config.server_url.clone());
        Self::new(transport, renderer, config)
    }
}

impl<T: ClientTransport, R: Renderer> Client<T, R> {
    /// A JSON client over an already connecting transport.
    pub fn new(transport: T, renderer: R, config: &ClientConfig) -> Self {
        Self::with_codec(transport, renderer, JsonCodec, config)
    }
}

impl<T: ClientTransport, R: Renderer, C: Codec> Client<T, R, C> {
    pub fn with_codec(
        transport: T,
        renderer: R,
        codec: C,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            codec,
            mirror: Mirror::new(renderer),
            initial_color: config.initial_color,
            report: Cadence::new(config.report_interval),
            drop_check: Cadence::new(config.drop_check_interval),
            recolor: config.recolor_interval.map(Cadence::new),
            connected: false,
        }
    }

    /// Runs one frame.
    pub fn update(&mut self, now: Instant) {
        loop {
            match self.transport.pop_event() {
                NetworkEvent::Empty => break,
                NetworkEvent::Connect => self.on_connect(),
                NetworkEvent::Data(bytes) => self.handle_data(&bytes, now),
                NetworkEvent::Disconnect => {
                    self.on_disconnect();
                    break;
                }
            }
        }

        if self.report.fire(now) {
            self.send_report();
        }
        if self.drop_check.fire(now) {
            self.mirror.drop_absent();
        }
        let recolor_due = self.recolor.as_mut().is_some_and(|c| c.fire(now));
        if recolor_due {
            self.recolor_own();
        }
    }

    /// Moves the own proxy. The move reaches the server with the next
    /// report. Returns `false` until the server has assigned an identity.
    pub fn translate_local(&mut self, delta: Vec3) -> bool {
        self.mirror.translate_own(delta)
    }

    /// Closes the connection and clears the own identity.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        if self.connected {
            self.on_disconnect();
        }
    }

    /// The identifier the server assigned, if any.
    pub fn own_id(&self) -> Option<&PlayerId> {
        self.mirror.own_id()
    }

    /// `true` between the transport's connect and disconnect.
    pub fn is_connected(&self) -> bool {
        self.connected && self.transport.is_alive()
    }

    pub fn mirror(&self) -> &Mirror<R> {
        &self.mirror
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.mirror.registry()
    }

    pub fn renderer(&self) -> &R {
        self.mirror.renderer()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    fn on_connect(&mut self) {
        self.connected = true;
        tracing::info!("connected to server");

        let hello = Message::Handshake {
            id: PlayerId::default(),
            position: Some(Vec3::ZERO),
            color: Some(self.initial_color),
        };
        self.send(&hello);
    }

    fn on_disconnect(&mut self) {
        let was_connected = std::mem::replace(&mut self.connected, false);
        self.report.stop();
        self.drop_check.stop();
        if let Some(recolor) = &mut self.recolor {
            recolor.stop();
        }
        match self.mirror.forget_identity() {
            Some(player_id) => tracing::info!(%player_id, "disconnected from server"),
            None if was_connected => tracing::info!("disconnected from server"),
            None => tracing::warn!("could not connect to server"),
        }
    }

    fn handle_data(&mut self, bytes: &[u8], now: Instant) {
        let msg = match self.codec.decode_message(bytes) {
            Ok(Decoded::Message(msg)) => msg,
            Ok(Decoded::UnknownKind(kind)) => {
                tracing::warn!(%kind, "unrecognized message kind");
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed message");
                return;
            }
        };

        match msg {
            Message::Handshake { id, .. } => self.on_handshake(id, now),
            Message::ServerUpdate { players } => {
                let created = self.mirror.merge_snapshot(&players);
                tracing::trace!(players = players.len(), created, "snapshot merged");
            }
            Message::PlayerUpdate { player } => {
                tracing::warn!(player_id = %player.id, "unexpected PLAYER_UPDATE from server");
            }
        }
    }

    fn on_handshake(&mut self, id: PlayerId, now: Instant) {
        if id.is_placeholder() {
            tracing::warn!("handshake without identifier ignored");
            return;
        }
        if !self.mirror.adopt_identity(id.clone(), self.initial_color) {
            tracing::debug!(player_id = %id, "repeated handshake ignored");
            return;
        }

        self.report.start(now);
        self.drop_check.start(now);
        if let Some(recolor) = &mut self.recolor {
            recolor.start(now);
        }
        tracing::info!(player_id = %id, "identity assigned");
    }

    // -----------------------------------------------------------------------
    // Cadence work
    // -----------------------------------------------------------------------

    fn send_report(&mut self) {
        let Some(state) = self.mirror.capture_own_state() else {
            return;
        };
        self.send(&Message::PlayerUpdate { player: state });
    }

    fn recolor_own(&mut self) {
        let mut rng = rand::rng();
        let color = Color::rgb(rng.random(), rng.random(), rng.random());
        if self.mirror.set_own_color(color) {
            tracing::trace!(?color, "own color re-rolled");
        }
    }

    fn send(&mut self, msg: &Message) {
        let bytes = match self.codec.encode_message(msg) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(kind = msg.kind(), error = %e, "failed to encode message");
                return;
            }
        };
        if let Err(e) = self.transport.send(&bytes) {
            tracing::debug!(kind = msg.kind(), error = %e, "send failed");
        }
    }
}
