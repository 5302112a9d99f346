//! Error types for the relay.

use topspin_protocol::{ParticipantId, ProtocolError, SessionId};
use topspin_transport::TransportError;

/// Errors that can occur while relaying.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The connection failed underneath us.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client did not complete the handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The client speaks another protocol version.
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    /// The session does not exist (anymore).
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The session has no free slot.
    #[error("session {0} is full")]
    SessionFull(SessionId),

    /// The participant is already in a session.
    #[error("participant {0} already in session {1}")]
    AlreadyInSession(ParticipantId, SessionId),

    /// The participant is not in any session.
    #[error("participant {0} is not in a session")]
    NotInSession(ParticipantId),

    /// The session's actor stopped or its command channel is closed.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),
}
