//! Core protocol types for Topspin's wire format.
//!
//! Everything in this module travels between a client and the relay:
//! identities, addressing, delivery guarantees, the system messages that
//! drive the session lifecycle, and the [`Envelope`] that wraps them all.
//!
//! Game traffic (spawns, snapshots, combat) lives in [`crate::game`] and
//! rides inside [`Payload::Route`] / [`Payload::Deliver`] as opaque bytes,
//! so the relay never has to understand it.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A connected player, identified by a relay-assigned number that stays
/// stable for the whole session.
///
/// Newtype over `u32` so a participant can never be confused with an
/// entity or a session id. `#[serde(transparent)]` keeps it a plain number
/// on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub u32);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A shared game instance hosted by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// A replicated in-world entity.
///
/// The high 32 bits hold the participant that minted the id (always the
/// authority at the time of the spawn), the low 32 bits a per-minter
/// serial. Two authorities therefore never hand out the same id, even
/// when authority moves mid-session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// Builds an id from the minting participant and its local serial.
    pub fn compose(creator: ParticipantId, serial: u32) -> Self {
        Self((u64::from(creator.0) << 32) | u64::from(serial))
    }

    /// The participant that minted this id.
    pub fn creator(self) -> ParticipantId {
        ParticipantId((self.0 >> 32) as u32)
    }

    /// The minter-local serial number.
    pub fn serial(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E-{}.{}", self.creator().0, self.serial())
    }
}

/// Public description of a participant, as shared in rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Relay-assigned id.
    pub id: ParticipantId,
    /// Name chosen by the player at handshake time.
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a message?
// ---------------------------------------------------------------------------

/// Addressing for a routed game message.
///
/// The relay resolves the recipient against the session roster at the
/// moment the message arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every participant in the session, including the sender.
    All,

    /// One specific participant.
    Participant(ParticipantId),

    /// Everyone except the given participant.
    AllExcept(ParticipantId),

    /// Whichever participant currently holds the authority role.
    Authority,
}

// ---------------------------------------------------------------------------
// Channel: delivery guarantees
// ---------------------------------------------------------------------------

/// The delivery guarantee for a message.
///
/// Combat and spawn traffic must arrive, so it uses the reliable
/// channels. Entity snapshots are sent many times per second and only the
/// latest one matters, so they go out unreliable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    /// Delivered in send order per recipient, no loss.
    #[default]
    ReliableOrdered,

    /// Delivered, but possibly out of order.
    ReliableUnordered,

    /// May be lost or reordered. Last value wins.
    Unreliable,
}

impl Channel {
    /// Returns `true` for the two reliable channels.
    pub fn is_reliable(self) -> bool {
        !matches!(self, Self::Unreliable)
    }
}

// ---------------------------------------------------------------------------
// SystemMessage: session plumbing
// ---------------------------------------------------------------------------

/// Messages exchanged between a client and the relay itself.
///
/// These handle connecting, finding or creating a session, roster changes
/// and authority hand-over. `#[serde(tag = "type")]` produces internally
/// tagged JSON: `{ "type": "JoinRandom", "game_version": "1.0" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    // -- Connection lifecycle --
    /// Client → Relay: first message on every connection.
    Handshake {
        version: u32,
        display_name: String,
    },

    /// Relay → Client: handshake accepted, here is your participant id.
    HandshakeAck {
        participant_id: ParticipantId,
        server_time: u64,
    },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },

    // -- Keep-alive --
    /// Client → Relay: "I'm still here."
    Heartbeat { client_time: u64 },

    /// Relay → Client: echo of the heartbeat with relay time.
    HeartbeatAck {
        client_time: u64,
        server_time: u64,
    },

    // -- Session lifecycle --
    /// Client → Relay: join any open session with a matching version tag.
    ///
    /// The relay does not answer when no session is open; the client's
    /// join timeout is the only signal that nothing was found.
    JoinRandom { game_version: String },

    /// Client → Relay: create a new session and become its authority.
    CreateSession {
        game_version: String,
        name: String,
        max_participants: usize,
    },

    /// Relay → Client: you are now in a session.
    SessionJoined {
        session_id: SessionId,
        name: String,
        participants: Vec<ParticipantInfo>,
        authority: ParticipantId,
        max_participants: usize,
    },

    /// Relay → Client: a join attempt was refused (e.g. the room filled up).
    JoinFailed { reason: String },

    /// Relay → Client: a create attempt was refused.
    CreateFailed { reason: String },

    /// Relay → Client: someone joined your session.
    ParticipantEntered { participant: ParticipantInfo },

    /// Relay → Client: someone left your session.
    ParticipantLeft { participant_id: ParticipantId },

    /// Relay → Client: the authority role moved to another participant.
    AuthorityChanged { authority: ParticipantId },

    /// Client → Relay: leave the current session.
    LeaveSession,

    // -- Errors --
    /// Relay → Client: something went wrong. HTTP-style codes.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload: what's inside an envelope
// ---------------------------------------------------------------------------

/// The content of an envelope.
///
/// Game data travels as opaque bytes produced by the client codec. On the
/// way in, the client names the recipient (`Route`); on the way out, the
/// relay stamps the sender (`Deliver`). Clients can never forge `from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// A relay-level message.
    System(SystemMessage),

    /// Client → Relay: forward `data` to `to`.
    Route { to: Recipient, data: Vec<u8> },

    /// Relay → Client: `data` was sent by participant `from`.
    Deliver { from: ParticipantId, data: Vec<u8> },
}

// ---------------------------------------------------------------------------
// Envelope: the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every frame on the wire is an Envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-sender sequence number, for diagnostics only.
    ///
    /// Snapshots are deliberately *not* ordered by it: a newer snapshot
    /// simply overwrites the previous one.
    pub seq: u64,

    /// Milliseconds since the sender started.
    pub timestamp: u64,

    /// Delivery guarantee. Missing in JSON means `ReliableOrdered`.
    #[serde(default)]
    pub channel: Channel,

    /// The actual content.
    pub payload: Payload,
}

impl Envelope {
    /// Wraps a system message on the reliable ordered channel.
    pub fn system(seq: u64, timestamp: u64, msg: SystemMessage) -> Self {
        Self {
            seq,
            timestamp,
            channel: Channel::ReliableOrdered,
            payload: Payload::System(msg),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
