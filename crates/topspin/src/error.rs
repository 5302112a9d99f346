//! Unified error type for the Topspin crates.

use topspin_arena::ArenaError;
use topspin_protocol::ProtocolError;
use topspin_relay::RelayError;
use topspin_session::SessionError;
use topspin_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `topspin` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TopspinError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (wrong coordinator state).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An arena-level error (spawn points, authority-only operations).
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// A relay-level error (handshake, rooms).
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Reading a config file failed.
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),

    /// A config file is not valid JSON for the expected shape.
    #[error("config: {0}")]
    Config(#[from] serde_json::Error),

    /// The client task has already stopped.
    #[error("client stopped")]
    ClientStopped,
}

#[cfg(test)]
mod tests {
    use topspin_protocol::{ParticipantId, SessionId};

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Closed("gone");
        let topspin_err: TopspinError = err.into();
        assert!(matches!(topspin_err, TopspinError::Transport(_)));
        assert!(topspin_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let topspin_err: TopspinError = err.into();
        assert!(matches!(topspin_err, TopspinError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let topspin_err: TopspinError = SessionError::NotConnected.into();
        assert!(matches!(topspin_err, TopspinError::Session(_)));
        assert_eq!(topspin_err.to_string(), "not connected");
    }

    #[test]
    fn test_from_arena_error() {
        let topspin_err: TopspinError = ArenaError::NotAuthority("spawn").into();
        assert!(matches!(topspin_err, TopspinError::Arena(_)));
    }

    #[test]
    fn test_from_relay_error() {
        let err = RelayError::AlreadyInSession(ParticipantId(2), SessionId(1));
        let topspin_err: TopspinError = err.into();
        assert!(matches!(topspin_err, TopspinError::Relay(_)));
    }

    #[test]
    fn test_from_json_error_is_config() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let topspin_err: TopspinError = err.into();
        assert!(matches!(topspin_err, TopspinError::Config(_)));
    }
}
