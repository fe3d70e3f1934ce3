//! Wire protocol for cubesync.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Types** ([`PlayerId`], [`Vec3`], [`Color`], [`PlayerState`],
//!   [`Message`]): the structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages are
//!   converted to and from bytes, including the header-first dispatch that
//!   turns unrecognized kinds into [`Decoded::UnknownKind`].
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding or
//!   decoding.
//!
//! The protocol layer knows nothing about connections or registries. It
//! sits between the transport (raw bytes) and the reconciliation logic:
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Registry (player state)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, Decoded};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{Color, Message, PlayerId, PlayerState, Vec3};
