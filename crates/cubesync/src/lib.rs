//! # cubesync
//!
//! Authoritative client-server synchronization of player state.
//!
//! A [`Server`] owns the canonical state of every connected player and
//! broadcasts a full snapshot on a fixed cadence. Each [`Client`] learns its
//! identity from the server's handshake, reports its own state on its own
//! cadence, mirrors everyone else from the snapshots, and drops players that
//! stop appearing in them.
//!
//! Both sides are driven by a single `update(now)` call per frame: drain
//! every pending transport event, then poll the cadences. Nothing in the
//! core blocks or locks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cubesync::prelude::*;
//!
//! # async fn run() -> Result<(), CubesyncError> {
//! let mut server = Server::builder().bind("0.0.0.0:9000").build().await?;
//! let mut frames = FrameScheduler::with_rate(60);
//! loop {
//!     let frame = frames.wait_for_frame().await;
//!     server.update(frame.now);
//! }
//! # }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod logging;
pub mod reconcile;
pub mod render;
pub mod server;

pub use client::Client;
pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use error::CubesyncError;
pub use server::{Server, ServerBuilder};

/// Everything needed to run a server or client.
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::{ClientConfig, ServerConfig};
    pub use crate::connection::{Connection, ConnectionState};
    pub use crate::error::CubesyncError;
    pub use crate::reconcile::Mirror;
    pub use crate::render::{HeadlessRenderer, Renderer};
    pub use crate::server::{Server, ServerBuilder};
    pub use cubesync_protocol::{
        Codec, Color, JsonCodec, Message, PlayerId, PlayerState, Vec3,
    };
    pub use cubesync_tick::{Cadence, FrameScheduler};
    pub use cubesync_transport::{
        ClientTransport, ConnectionId, MemoryNetwork, NetworkEvent,
        ServerTransport, WebSocketClient, WebSocketServer,
    };
}
