//! End-to-end coordinator flows driven purely by loop time.

use std::time::Duration;

use topspin_protocol::{ParticipantId, ParticipantInfo, SessionId};
use topspin_session::{
    CoordinatorState, LinkCommand, RoleChange, SessionConfig, SessionContext,
    SessionCoordinator, SessionEvent,
};

fn secs(v: f64) -> Duration {
    Duration::from_secs_f64(v)
}

fn me(id: u32) -> ParticipantInfo {
    ParticipantInfo {
        id: ParticipantId(id),
        display_name: format!("player-{id}"),
    }
}

#[test]
fn test_join_timeout_creates_session_and_becomes_authority() {
    let config = SessionConfig::default();
    let mut coord = SessionCoordinator::new(config.clone());
    let mut ctx = SessionContext::new(config);

    coord.connect(Duration::ZERO).unwrap();
    coord.handle(
        &mut ctx,
        &SessionEvent::Connected {
            participant_id: ParticipantId(1),
        },
        secs(0.1),
    );
    assert!(matches!(
        coord.take_commands().as_slice(),
        [LinkCommand::Connect, LinkCommand::JoinRandom { .. }]
    ));

    // Nobody answers the join request.
    assert_eq!(coord.tick(&mut ctx, secs(5.0)), RoleChange::Unchanged);
    assert_eq!(coord.state(), CoordinatorState::SearchingSession);

    coord.tick(&mut ctx, secs(5.1));
    assert_eq!(coord.state(), CoordinatorState::CreatingSession);
    let name = match coord.take_commands().as_slice() {
        [LinkCommand::CreateSession { name, .. }] => name.clone(),
        other => panic!("expected CreateSession, got {other:?}"),
    };

    let change = coord.handle(
        &mut ctx,
        &SessionEvent::SessionJoined {
            session_id: SessionId(1),
            name,
            participants: vec![me(1)],
            authority: ParticipantId(1),
            max_participants: 4,
        },
        secs(5.2),
    );

    assert_eq!(change, RoleChange::Promoted);
    assert_eq!(coord.state(), CoordinatorState::InSession);
    assert!(ctx.is_authority());
}

#[test]
fn test_join_before_timeout_cancels_create() {
    let config = SessionConfig::default();
    let mut coord = SessionCoordinator::new(config.clone());
    let mut ctx = SessionContext::new(config);

    coord.connect(Duration::ZERO).unwrap();
    coord.handle(
        &mut ctx,
        &SessionEvent::Connected {
            participant_id: ParticipantId(3),
        },
        secs(0.1),
    );
    coord.handle(
        &mut ctx,
        &SessionEvent::SessionJoined {
            session_id: SessionId(1),
            name: "arena-1-1".into(),
            participants: vec![me(1), me(3)],
            authority: ParticipantId(1),
            max_participants: 4,
        },
        secs(1.0),
    );
    coord.take_commands();

    // The stale search deadline must not fire a create.
    coord.tick(&mut ctx, secs(10.0));
    assert!(coord.take_commands().is_empty());
    assert_eq!(coord.state(), CoordinatorState::InSession);
    assert!(!ctx.is_authority());
}
