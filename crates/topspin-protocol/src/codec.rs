//! Codec trait and implementations for serializing/deserializing messages.
//!
//! Nothing above this module cares how bytes are produced; it only needs
//! something that implements [`Codec`]. Clients use the same codec for
//! envelopes and for the game messages nested inside them.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and back.
///
/// `Send + Sync + 'static` because a codec is shared between the update
/// loop and the link task for the lifetime of a client.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] if the value cannot be represented.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError`] if the bytes are malformed or do not
    /// match `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`. Readable in logs and browser tools.
///
/// ```rust
/// use topspin_protocol::{Codec, GameMessage, JsonCodec, ParticipantId};
///
/// let codec = JsonCodec;
/// let msg = GameMessage::SpawnRequest { requesting: ParticipantId(3) };
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: GameMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
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
