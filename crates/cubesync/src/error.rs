//! Unified error type for cubesync.

use cubesync_protocol::ProtocolError;
use cubesync_session::SessionError;
use cubesync_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant generates the `From` impl, so `?` converts
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CubesyncError {
    /// A transport-level error (bind, send on a closed connection).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry error (duplicate or unknown player).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The configuration could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
