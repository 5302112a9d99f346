//! Wire protocol for Topspin.
//!
//! This crate defines what clients and the relay say to each other:
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`Recipient`], [`Channel`]
//!   and the identity newtypes): the session plumbing.
//! - **Game messages** ([`GameMessage`], [`EntitySnapshot`]): spawn,
//!   replication, combat and score traffic between participants.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session (participant context)
//! ```

mod codec;
mod error;
mod game;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use game::{EntitySnapshot, GameMessage};
pub use types::{
    Channel, EntityId, Envelope, ParticipantId, ParticipantInfo, Payload,
    Recipient, SessionId, SystemMessage,
};

/// Protocol version exchanged in the handshake. The relay rejects any
/// other value.
pub const PROTOCOL_VERSION: u32 = 1;
