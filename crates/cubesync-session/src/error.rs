//! Error types for the session layer.

use cubesync_protocol::PlayerId;

/// Errors returned by [`SessionRegistry`](crate::SessionRegistry)
/// operations.
///
/// Neither is fatal. Callers log them and carry on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An entry for this player already exists. Identifiers appear at most
    /// once in a registry.
    #[error("player {0} is already registered")]
    AlreadyRegistered(PlayerId),

    /// No entry exists for this player. Typically a late update from a
    /// player whose connection has already been reaped.
    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),
}
