//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between Rust values and raw bytes. The rest of the
//! system only talks to the [`Codec`] trait, so the wire format can change
//! without touching the server or client.
//!
//! Decoding a [`Message`] is two-step: first only the `cmd` header is read.
//! A kind outside the known set becomes [`Decoded::UnknownKind`] instead of
//! an error, so newer peers can add message kinds without older peers
//! treating them as malformed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Message, PlayerId, ProtocolError};

/// Result of decoding one transport message.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A message of a known kind.
    Message(Message),
    /// A well-formed message whose `cmd` is not one we understand.
    UnknownKind(String),
}

/// Just enough of a message to dispatch on. Other fields are ignored.
#[derive(Deserialize)]
struct Header {
    cmd: String,
}

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` lets a codec live inside long-running tasks or be
/// shared across threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;

    /// Encodes one protocol message.
    ///
    /// # Errors
    /// `ProtocolError::InvalidMessage` if a position or color holds NaN or
    /// an infinity, which the wire format would silently turn into `null`.
    fn encode_message(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError>
    where
        Self: Sized,
    {
        ensure_finite(msg)?;
        self.encode(msg)
    }

    /// Decodes one protocol message, dispatching on its `cmd` header.
    ///
    /// # Errors
    /// `ProtocolError::Decode` if the bytes are not a message at all or a
    /// known kind has malformed fields. `ProtocolError::InvalidMessage` if
    /// a snapshot lists the same player twice.
    fn decode_message(&self, data: &[u8]) -> Result<Decoded, ProtocolError>
    where
        Self: Sized,
    {
        let header: Header = self.decode(data)?;
        if !Message::KINDS.contains(&header.cmd.as_str()) {
            return Ok(Decoded::UnknownKind(header.cmd));
        }

        let msg: Message = self.decode(data)?;
        if let Message::ServerUpdate { players } = &msg {
            let mut seen = HashSet::with_capacity(players.len());
            if let Some(dup) = players.iter().find(|p| !seen.insert(&p.id)) {
                return Err(ProtocolError::InvalidMessage(format!(
                    "player {} listed twice in snapshot",
                    dup.id
                )));
            }
        }
        Ok(Decoded::Message(msg))
    }
}

fn ensure_finite(msg: &Message) -> Result<(), ProtocolError> {
    let non_finite = |what: &str, id: &PlayerId| {
        ProtocolError::InvalidMessage(format!("non-finite {what} for player {id}"))
    };
    match msg {
        Message::Handshake { id, position, color } => {
            if position.is_some_and(|p| !p.is_finite()) {
                return Err(non_finite("position", id));
            }
            if color.is_some_and(|c| !c.is_finite()) {
                return Err(non_finite("color", id));
            }
        }
        Message::PlayerUpdate { player } => {
            if !player.is_finite() {
                return Err(non_finite("state", &player.id));
            }
        }
        Message::ServerUpdate { players } => {
            if let Some(bad) = players.iter().find(|p| !p.is_finite()) {
                return Err(non_finite("state", &bad.id));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// One complete JSON document per transport message. Behind the `json`
/// feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use cubesync_protocol::{Codec, Decoded, JsonCodec, Message, PlayerId};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode_message(&Message::handshake(PlayerId::new("c1"))).unwrap();
/// assert_eq!(bytes, br#"{"cmd":"HANDSHAKE","id":"c1"}"#);
///
/// match codec.decode_message(&bytes).unwrap() {
///     Decoded::Message(Message::Handshake { id, .. }) => assert_eq!(id.as_str(), "c1"),
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
