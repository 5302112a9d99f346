//! Error types for the session layer.

use crate::CoordinatorState;

/// Errors returned by session-level operations.
///
/// Only caller mistakes end up here. Transport trouble and join/create
/// refusals are recovered inside the coordinator and surfaced as status
/// text instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs a live connection.
    #[error("not connected")]
    NotConnected,

    /// The operation needs the participant to be inside a session.
    #[error("not in a session")]
    NotInSession,

    /// The coordinator is in a state that does not allow the operation.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: CoordinatorState,
    },
}
