//! Error types for the protocol layer.
//!
//! Every protocol error is recoverable: the offending message is dropped
//! and the connection stays open.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing `cmd` header, or
    /// fields that don't match the declared kind.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule, such as a snapshot
    /// listing the same player twice.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
