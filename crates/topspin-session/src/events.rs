//! The session event bus.
//!
//! Everything that happens to a client from the outside (link state
//! changes, relay notifications, gameplay messages from peers) becomes a
//! [`SessionEvent`]. The client runtime publishes them into an
//! [`EventQueue`] and dispatches each one with a single exhaustive `match`,
//! so every message kind has exactly one handler per component and a new
//! kind cannot be forgotten silently.

use std::collections::VecDeque;

use topspin_protocol::{GameMessage, ParticipantId, ParticipantInfo, SessionId};

/// Something that happened to the local client.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The handshake completed and the relay assigned us an id.
    Connected { participant_id: ParticipantId },

    /// A connection attempt failed.
    ConnectFailed { reason: String },

    /// An established connection was lost.
    Disconnected { reason: String },

    /// We are now inside a session.
    SessionJoined {
        session_id: SessionId,
        name: String,
        participants: Vec<ParticipantInfo>,
        authority: ParticipantId,
        max_participants: usize,
    },

    /// The relay had no open session for our join request.
    JoinFailed { reason: String },

    /// The relay refused to create a session.
    CreateFailed { reason: String },

    /// Someone joined our session.
    ParticipantEntered(ParticipantInfo),

    /// Someone left our session.
    ParticipantLeft(ParticipantId),

    /// A new participant holds authority.
    AuthorityChanged(ParticipantId),

    /// A gameplay message from a peer (possibly ourselves, for `All`).
    Message {
        from: ParticipantId,
        message: GameMessage,
    },

    /// The relay reported an error.
    RelayError { code: u16, message: String },
}

impl SessionEvent {
    /// A short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Disconnected { .. } => "disconnected",
            Self::SessionJoined { .. } => "session_joined",
            Self::JoinFailed { .. } => "join_failed",
            Self::CreateFailed { .. } => "create_failed",
            Self::ParticipantEntered(_) => "participant_entered",
            Self::ParticipantLeft(_) => "participant_left",
            Self::AuthorityChanged(_) => "authority_changed",
            Self::Message { message, .. } => message.kind(),
            Self::RelayError { .. } => "relay_error",
        }
    }
}

/// FIFO of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    queue: VecDeque<SessionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, event: SessionEvent) {
        self.queue.push_back(event);
    }

    /// Takes the oldest pending event.
    pub fn next(&mut self) -> Option<SessionEvent> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
