//! The session coordinator: connect, find or create a session, recover.
//!
//! The coordinator is a plain state machine. It never touches the network
//! directly; it consumes [`SessionEvent`]s and loop-time ticks, and emits
//! [`LinkCommand`]s for the client runtime to carry out.
//!
//! ```text
//!                connect()
//!  Disconnected ───────────→ Connecting ──(connected)──→ SearchingSession
//!       ↑                        │   ↑                     │   ↑      │
//!       │          (failed, out  │   │ (failed/lost,       │   │      │ (joined)
//!       │           of retries)  │   │  retries left)      │   │      ▼
//!       └────────────────────────┘   └─────────────────────┼───┼── InSession
//!                                                          │   │
//!                          (join failed / search timeout)  ▼   │ (create failed)
//!                                                    CreatingSession
//! ```
//!
//! The search starts by itself on `Connected`;
//! [`SessionCoordinator::join_or_create`] restarts it. Whoever creates a
//! session becomes its authority. Connectivity failures
//! trigger an immediate reconnect, up to
//! [`SessionConfig::max_reconnect_attempts`] in a row.

use std::fmt;
use std::time::Duration;

use topspin_tick::{TimerQueue, TimerToken};
use tracing::{debug, info, warn};

use crate::context::JoinedSession;
use crate::{RoleChange, SessionConfig, SessionContext, SessionError, SessionEvent};

// ---------------------------------------------------------------------------
// State and commands
// ---------------------------------------------------------------------------

/// Where the coordinator is in the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Disconnected,
    Connecting,
    SearchingSession,
    CreatingSession,
    InSession,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::SearchingSession => "searching for a session",
            Self::CreatingSession => "creating a session",
            Self::InSession => "in session",
        };
        f.write_str(s)
    }
}

/// Something the runtime must do on the link to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Open a fresh connection (dropping any previous one).
    Connect,
    /// Ask the relay for any open session with our version.
    JoinRandom { game_version: String },
    /// Ask the relay to create a session with us as authority.
    CreateSession {
        game_version: String,
        name: String,
        max_participants: usize,
    },
    /// Leave the current session.
    LeaveSession,
    /// Close the connection.
    Disconnect { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    Connect,
    Search,
    Create,
}

// ---------------------------------------------------------------------------
// SessionCoordinator
// ---------------------------------------------------------------------------

/// Drives one client from "not connected" to "in a session" and keeps it
/// there.
pub struct SessionCoordinator {
    config: SessionConfig,
    state: CoordinatorState,
    status: String,
    reconnect_attempts: u32,
    create_attempts: u32,
    timers: TimerQueue<Deadline>,
    /// At most one deadline is armed at a time; it belongs to the
    /// current state.
    armed: Option<TimerToken>,
    commands: Vec<LinkCommand>,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: CoordinatorState::Disconnected,
            status: "Disconnected".to_string(),
            reconnect_attempts: 0,
            create_attempts: 0,
            timers: TimerQueue::new(),
            armed: None,
            commands: Vec::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Consecutive reconnect attempts since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Takes the link commands emitted since the last call.
    pub fn take_commands(&mut self) -> Vec<LinkCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Starts connecting.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] unless currently disconnected.
    pub fn connect(&mut self, now: Duration) -> Result<(), SessionError> {
        if self.state != CoordinatorState::Disconnected {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }
        self.reconnect_attempts = 0;
        self.begin_connect(now);
        Ok(())
    }

    /// Searches for an open session and creates one if none turns up within
    /// [`SessionConfig::join_timeout`]. Runs on its own once the relay
    /// accepts the connection; calling it again restarts the search and
    /// the creation counter.
    ///
    /// # Errors
    /// [`SessionError::InvalidState`] unless connected and outside a session.
    pub fn join_or_create(&mut self, now: Duration) -> Result<(), SessionError> {
        match self.state {
            CoordinatorState::SearchingSession | CoordinatorState::CreatingSession => {
                self.create_attempts = 0;
                self.begin_search(now);
                Ok(())
            }
            state => Err(SessionError::InvalidState {
                operation: "join_or_create",
                state,
            }),
        }
    }

    /// Leaves the session (if any) and disconnects. No reconnect follows.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] if already disconnected.
    pub fn leave(&mut self, ctx: &mut SessionContext) -> Result<RoleChange, SessionError> {
        match self.state {
            CoordinatorState::Disconnected => return Err(SessionError::NotConnected),
            CoordinatorState::InSession => self.commands.push(LinkCommand::LeaveSession),
            _ => {}
        }
        self.commands.push(LinkCommand::Disconnect {
            reason: "left".to_string(),
        });
        self.disarm();
        self.state = CoordinatorState::Disconnected;
        self.status = "Left session".to_string();
        info!("left session");
        Ok(ctx.reset())
    }

    /// Fires expired deadlines. Call once per frame.
    pub fn tick(&mut self, ctx: &mut SessionContext, now: Duration) -> RoleChange {
        let mut change = RoleChange::Unchanged;
        for (token, deadline) in self.timers.drain_due(now) {
            if self.armed == Some(token) {
                self.armed = None;
            }
            match (deadline, self.state) {
                (Deadline::Connect, CoordinatorState::Connecting) => {
                    change = merge(change, self.connectivity_lost(ctx, "connect timeout", now));
                }
                (Deadline::Search, CoordinatorState::SearchingSession) => {
                    info!(
                        waited_ms = self.config.join_timeout.as_millis() as u64,
                        "no open session found, creating one"
                    );
                    self.begin_create(ctx, now);
                }
                (Deadline::Create, CoordinatorState::CreatingSession) => {
                    warn!("session creation timed out, searching again");
                    self.begin_search(now);
                }
                _ => {}
            }
        }
        change
    }

    /// Applies an event. Returns how the local role changed.
    pub fn handle(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
        now: Duration,
    ) -> RoleChange {
        use CoordinatorState as S;

        match (event, self.state) {
            (SessionEvent::Connected { participant_id }, S::Connecting) => {
                self.disarm();
                ctx.set_local(*participant_id);
                self.reconnect_attempts = 0;
                info!(participant = %participant_id, "connected to relay");
                self.begin_search(now);
                RoleChange::Unchanged
            }
            (SessionEvent::ConnectFailed { reason }, S::Connecting) => {
                self.connectivity_lost(ctx, reason, now)
            }
            (SessionEvent::Disconnected { reason }, state) if state != S::Disconnected => {
                self.connectivity_lost(ctx, reason, now)
            }
            (
                SessionEvent::SessionJoined {
                    session_id,
                    name,
                    participants,
                    authority,
                    max_participants,
                },
                S::SearchingSession | S::CreatingSession,
            ) => {
                self.disarm();
                self.create_attempts = 0;
                let change = ctx.enter_session(
                    JoinedSession {
                        id: *session_id,
                        name: name.clone(),
                        max_participants: *max_participants,
                    },
                    participants.clone(),
                    *authority,
                );
                self.state = S::InSession;
                self.status = format!("In session {name}");
                info!(
                    session = %session_id,
                    authority = %authority,
                    participants = participants.len(),
                    is_authority = ctx.is_authority(),
                    "joined session"
                );
                change
            }
            (SessionEvent::JoinFailed { reason }, S::SearchingSession) => {
                debug!(%reason, "join failed");
                self.begin_create(ctx, now);
                RoleChange::Unchanged
            }
            (SessionEvent::CreateFailed { reason }, S::CreatingSession) => {
                warn!(%reason, "create failed, searching again");
                self.begin_search(now);
                RoleChange::Unchanged
            }
            (SessionEvent::ParticipantEntered(participant), S::InSession) => {
                if ctx.add_participant(participant.clone()) {
                    info!(participant = %participant.id, name = %participant.display_name, "participant entered");
                }
                RoleChange::Unchanged
            }
            (SessionEvent::ParticipantLeft(id), S::InSession) => {
                if ctx.remove_participant(*id) {
                    info!(participant = %id, "participant left");
                }
                RoleChange::Unchanged
            }
            (SessionEvent::AuthorityChanged(authority), S::InSession) => {
                let change = ctx.set_authority(*authority);
                info!(authority = %authority, ?change, "authority changed");
                change
            }
            (SessionEvent::RelayError { code, message }, _) => {
                warn!(code, %message, "relay error");
                RoleChange::Unchanged
            }
            (SessionEvent::Message { .. }, _) => RoleChange::Unchanged,
            (event, state) => {
                debug!(event = event.kind(), %state, "ignoring event in current state");
                RoleChange::Unchanged
            }
        }
    }

    // -- transitions --------------------------------------------------------

    fn begin_connect(&mut self, now: Duration) {
        self.state = CoordinatorState::Connecting;
        self.status = "Connecting".to_string();
        self.commands.push(LinkCommand::Connect);
        self.arm(now + self.config.connect_timeout, Deadline::Connect);
    }

    fn begin_search(&mut self, now: Duration) {
        self.state = CoordinatorState::SearchingSession;
        self.status = "Searching for a session".to_string();
        self.commands.push(LinkCommand::JoinRandom {
            game_version: self.config.game_version.clone(),
        });
        self.arm(now + self.config.join_timeout, Deadline::Search);
    }

    fn begin_create(&mut self, ctx: &SessionContext, now: Duration) {
        self.create_attempts += 1;
        let owner = ctx.local_id().map_or(0, |id| id.0);
        let name = format!(
            "{}-{}-{}",
            self.config.session_name_prefix, owner, self.create_attempts
        );
        self.state = CoordinatorState::CreatingSession;
        self.status = format!("Creating session {name}");
        self.commands.push(LinkCommand::CreateSession {
            game_version: self.config.game_version.clone(),
            name,
            max_participants: self.config.max_participants,
        });
        self.arm(now + self.config.join_timeout, Deadline::Create);
    }

    fn connectivity_lost(
        &mut self,
        ctx: &mut SessionContext,
        reason: &str,
        now: Duration,
    ) -> RoleChange {
        self.disarm();
        let change = ctx.reset();
        let max = self.config.max_reconnect_attempts;
        if self.reconnect_attempts < max {
            self.reconnect_attempts += 1;
            warn!(%reason, attempt = self.reconnect_attempts, max, "connection lost, reconnecting");
            self.begin_connect(now);
            self.status = format!(
                "Connection lost ({reason}), reconnecting {}/{max}",
                self.reconnect_attempts
            );
        } else {
            warn!(%reason, "connection lost, giving up");
            self.state = CoordinatorState::Disconnected;
            self.status = format!("Disconnected: {reason}");
        }
        change
    }

    fn arm(&mut self, at: Duration, deadline: Deadline) {
        self.disarm();
        self.armed = Some(self.timers.schedule(at, deadline));
    }

    fn disarm(&mut self) {
        if let Some(token) = self.armed.take() {
            self.timers.cancel(token);
        }
    }
}

fn merge(a: RoleChange, b: RoleChange) -> RoleChange {
    if b == RoleChange::Unchanged { a } else { b }
}

#[cfg(test)]
mod tests {
    use topspin_protocol::{ParticipantId, ParticipantInfo, SessionId};

    use super::*;

    fn secs(v: f64) -> Duration {
        Duration::from_secs_f64(v)
    }

    fn setup() -> (SessionCoordinator, SessionContext) {
        let config = SessionConfig::default();
        (
            SessionCoordinator::new(config.clone()),
            SessionContext::new(config),
        )
    }

    fn joined(authority: u32, members: &[u32]) -> SessionEvent {
        SessionEvent::SessionJoined {
            session_id: SessionId(7),
            name: "arena-1-1".into(),
            participants: members
                .iter()
                .map(|&id| ParticipantInfo {
                    id: ParticipantId(id),
                    display_name: format!("p{id}"),
                })
                .collect(),
            authority: ParticipantId(authority),
            max_participants: 4,
        }
    }

    #[test]
    fn test_connect_emits_connect_command() {
        let (mut coord, _) = setup();
        coord.connect(Duration::ZERO).unwrap();
        assert_eq!(coord.state(), CoordinatorState::Connecting);
        assert_eq!(coord.take_commands(), vec![LinkCommand::Connect]);
    }

    #[test]
    fn test_connect_twice_is_invalid() {
        let (mut coord, _) = setup();
        coord.connect(Duration::ZERO).unwrap();
        assert!(matches!(
            coord.connect(Duration::ZERO),
            Err(SessionError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_connected_starts_search() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.take_commands();
        coord.handle(
            &mut ctx,
            &SessionEvent::Connected {
                participant_id: ParticipantId(4),
            },
            secs(0.1),
        );
        assert_eq!(coord.state(), CoordinatorState::SearchingSession);
        assert_eq!(ctx.local_id(), Some(ParticipantId(4)));
        assert!(matches!(
            coord.take_commands().as_slice(),
            [LinkCommand::JoinRandom { .. }]
        ));
    }

    #[test]
    fn test_join_or_create_restarts_search() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        coord.handle(&mut ctx, &SessionEvent::JoinFailed { reason: "none".into() }, secs(0.2));
        assert_eq!(coord.state(), CoordinatorState::CreatingSession);
        coord.take_commands();

        coord.join_or_create(secs(0.3)).unwrap();
        assert_eq!(coord.state(), CoordinatorState::SearchingSession);
        assert!(matches!(
            coord.take_commands().as_slice(),
            [LinkCommand::JoinRandom { .. }]
        ));

        // The search deadline counts from the restart, and creation numbering
        // starts over.
        coord.tick(&mut ctx, secs(1.0));
        assert_eq!(coord.state(), CoordinatorState::SearchingSession);
        coord.tick(&mut ctx, secs(0.3) + SessionConfig::default().join_timeout);
        match coord.take_commands().as_slice() {
            [LinkCommand::CreateSession { name, .. }] => assert_eq!(name, "arena-2-1"),
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_join_or_create_outside_connection_is_invalid() {
        let (mut coord, mut ctx) = setup();
        assert!(matches!(
            coord.join_or_create(Duration::ZERO),
            Err(SessionError::InvalidState { operation: "join_or_create", .. })
        ));
        coord.connect(Duration::ZERO).unwrap();
        assert!(coord.join_or_create(Duration::ZERO).is_err());
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        coord.handle(&mut ctx, &joined(2, &[2]), secs(0.2));
        assert_eq!(coord.state(), CoordinatorState::InSession);
        assert!(coord.join_or_create(secs(0.3)).is_err());
    }

    #[test]
    fn test_join_failed_creates_session() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        coord.take_commands();
        coord.handle(&mut ctx, &SessionEvent::JoinFailed { reason: "none".into() }, secs(0.2));
        assert_eq!(coord.state(), CoordinatorState::CreatingSession);
        match coord.take_commands().as_slice() {
            [LinkCommand::CreateSession { name, max_participants, .. }] => {
                assert_eq!(name, "arena-2-1");
                assert_eq!(*max_participants, 4);
            }
            other => panic!("unexpected commands: {other:?}"),
        }
    }

    #[test]
    fn test_create_failed_falls_back_to_join() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        coord.handle(&mut ctx, &SessionEvent::JoinFailed { reason: "none".into() }, secs(0.2));
        coord.take_commands();
        coord.handle(&mut ctx, &SessionEvent::CreateFailed { reason: "full".into() }, secs(0.3));
        assert_eq!(coord.state(), CoordinatorState::SearchingSession);
        assert!(matches!(
            coord.take_commands().as_slice(),
            [LinkCommand::JoinRandom { .. }]
        ));
    }

    #[test]
    fn test_joined_as_non_creator_is_not_authority() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        let change = coord.handle(&mut ctx, &joined(1, &[1, 2]), secs(0.3));
        assert_eq!(change, RoleChange::Unchanged);
        assert_eq!(coord.state(), CoordinatorState::InSession);
        assert!(!ctx.is_authority());
        assert_eq!(ctx.roster().len(), 2);
    }

    #[test]
    fn test_authority_changed_promotes_local() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(2) }, secs(0.1));
        coord.handle(&mut ctx, &joined(1, &[1, 2]), secs(0.3));
        coord.handle(&mut ctx, &SessionEvent::ParticipantLeft(ParticipantId(1)), secs(1.0));
        let change = coord.handle(
            &mut ctx,
            &SessionEvent::AuthorityChanged(ParticipantId(2)),
            secs(1.0),
        );
        assert_eq!(change, RoleChange::Promoted);
        assert!(ctx.is_authority());
        assert_eq!(ctx.roster().len(), 1);
    }

    #[test]
    fn test_disconnect_in_session_reconnects() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(1) }, secs(0.1));
        coord.handle(&mut ctx, &joined(1, &[1]), secs(0.2));
        coord.take_commands();

        let change = coord.handle(
            &mut ctx,
            &SessionEvent::Disconnected { reason: "reset".into() },
            secs(3.0),
        );
        assert_eq!(change, RoleChange::Demoted);
        assert_eq!(coord.state(), CoordinatorState::Connecting);
        assert_eq!(coord.reconnect_attempts(), 1);
        assert!(!ctx.in_session());
        assert_eq!(coord.take_commands(), vec![LinkCommand::Connect]);
    }

    #[test]
    fn test_reconnect_gives_up_after_max_attempts() {
        let config = SessionConfig {
            max_reconnect_attempts: 2,
            ..SessionConfig::default()
        };
        let mut coord = SessionCoordinator::new(config.clone());
        let mut ctx = SessionContext::new(config);
        coord.connect(Duration::ZERO).unwrap();
        for i in 0..3 {
            coord.handle(
                &mut ctx,
                &SessionEvent::ConnectFailed { reason: "refused".into() },
                secs(f64::from(i)),
            );
        }
        assert_eq!(coord.state(), CoordinatorState::Disconnected);
        assert!(coord.status().contains("refused"));
    }

    #[test]
    fn test_connect_timeout_counts_as_failure() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.take_commands();
        coord.tick(&mut ctx, secs(4.9));
        assert!(coord.take_commands().is_empty());
        coord.tick(&mut ctx, secs(5.0));
        assert_eq!(coord.take_commands(), vec![LinkCommand::Connect]);
        assert_eq!(coord.reconnect_attempts(), 1);
    }

    #[test]
    fn test_leave_emits_leave_and_disconnect() {
        let (mut coord, mut ctx) = setup();
        coord.connect(Duration::ZERO).unwrap();
        coord.handle(&mut ctx, &SessionEvent::Connected { participant_id: ParticipantId(1) }, secs(0.1));
        coord.handle(&mut ctx, &joined(1, &[1]), secs(0.2));
        coord.take_commands();

        let change = coord.leave(&mut ctx).unwrap();
        assert_eq!(change, RoleChange::Demoted);
        assert_eq!(
            coord.take_commands(),
            vec![
                LinkCommand::LeaveSession,
                LinkCommand::Disconnect { reason: "left".into() }
            ]
        );
        // A disconnect after leaving does not trigger a reconnect.
        coord.handle(&mut ctx, &SessionEvent::Disconnected { reason: "closed".into() }, secs(1.0));
        assert_eq!(coord.state(), CoordinatorState::Disconnected);
        assert!(coord.take_commands().is_empty());
    }

    #[test]
    fn test_leave_when_disconnected_errors() {
        let (mut coord, mut ctx) = setup();
        assert!(matches!(coord.leave(&mut ctx), Err(SessionError::NotConnected)));
    }
}
