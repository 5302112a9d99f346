//! Combat: damage formula, spawn immunity, health bounds, kill credit and
//! respawn.

mod common;

use std::time::Duration;

use common::{Match, p};
use glam::{Quat, Vec3};
use topspin_arena::{
    Body, CollisionResolver, CollisionResult, CombatConfig, DamageOutcome, EntityRecord,
    IgnoreReason, OwnedEntity,
};
use topspin_protocol::{EntityId, GameMessage, ParticipantId, Recipient};
use topspin_session::Outbox;

fn secs(v: f64) -> Duration {
    Duration::from_secs_f64(v)
}

fn record(owner: u32, position: Vec3) -> EntityRecord {
    EntityRecord {
        entity: EntityId::compose(ParticipantId(1), owner),
        owner: p(owner),
        spawn_point: owner as usize,
        position,
        rotation: Quat::IDENTITY,
        health: 100.0,
    }
}

fn damage_sent(outbox: &mut Outbox) -> Vec<(Recipient, f32)> {
    outbox
        .drain()
        .into_iter()
        .filter_map(|out| match out.message {
            GameMessage::Damage { amount, .. } => Some((out.to, amount)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_resolve_spinning_attacker_deals_double_damage() {
    let config = CombatConfig::default();
    let mut resolver = CollisionResolver::new(config);
    let mut attacker = OwnedEntity::spawn(&record(1, Vec3::ZERO), 100.0, Duration::ZERO);
    attacker.apply_knockback(Vec3::X, 10.0);
    attacker.set_spinning(true);
    let mut victim = OwnedEntity::spawn(&record(2, Vec3::new(0.8, 0.0, 0.0)), 100.0, Duration::ZERO);

    let mut outbox = Outbox::new();
    let now = secs(3.0);
    let result = resolver.resolve(&mut attacker, &Body::of(&victim), &mut outbox, now);
    let CollisionResult::Resolved(impact) = result else {
        panic!("contact not resolved: {result:?}");
    };
    assert!((impact.damage - 20.0).abs() < 1e-4);
    assert_eq!(damage_sent(&mut outbox), vec![(Recipient::Participant(p(2)), impact.damage)]);

    let outcome = resolver.on_damage(&mut victim, impact.damage, p(1), &mut outbox, now);
    assert!(matches!(outcome, DamageOutcome::Applied { health } if (health - 80.0).abs() < 1e-4));
    assert!((victim.health() - 80.0).abs() < 1e-4);
}

#[test]
fn test_on_damage_during_spawn_immunity_is_ignored() {
    let config = CombatConfig::default();
    let resolver = CollisionResolver::new(config);
    let mut victim = OwnedEntity::spawn(&record(2, Vec3::ZERO), 100.0, Duration::ZERO);
    let mut outbox = Outbox::new();

    let outcome = resolver.on_damage(&mut victim, 20.0, p(1), &mut outbox, secs(1.0));
    assert_eq!(outcome, DamageOutcome::Ignored(IgnoreReason::Immune));
    assert_eq!(victim.health(), 100.0);
    assert!(outbox.is_empty());
}

#[test]
fn test_apply_damage_clamps_and_dies_once() {
    let config = CombatConfig::default();
    let mut entity = OwnedEntity::spawn(&record(2, Vec3::ZERO), 100.0, Duration::ZERO);
    let now = secs(5.0);

    let first = entity.apply_damage(250.0, Some(p(1)), now, &config);
    assert_eq!(first, DamageOutcome::Died { killer: Some(p(1)) });
    assert_eq!(entity.health(), 0.0);

    let second = entity.apply_damage(10.0, Some(p(3)), now, &config);
    assert_eq!(second, DamageOutcome::Ignored(IgnoreReason::Dead));
    assert_eq!(entity.kill(now, config.attribution_window), None);
    assert!(entity.health() >= 0.0 && entity.health() <= entity.max_health());
}

#[test]
fn test_kill_credits_attacker_and_respawns_victim() {
    let mut m = Match::new();
    m.join(1);
    m.join(2);
    m.join(3);
    m.run_for(secs(2.5));

    let victim_entity = m.peer(2).arena.local_entity().map(|e| e.id()).unwrap();
    m.peer_mut(1).outbox.reliable(
        Recipient::Participant(p(2)),
        GameMessage::Damage {
            entity: victim_entity,
            amount: 150.0,
            attacker: p(1),
        },
    );
    m.deliver();

    // The victim is gone everywhere and the kill is on every board.
    for id in 1..=3 {
        let peer = m.peer(id);
        assert!(!peer.arena.registry().contains(victim_entity), "peer {id}");
        let killer = peer.arena.board().get(p(1)).copied().unwrap_or_default();
        let victim = peer.arena.board().get(p(2)).copied().unwrap_or_default();
        assert_eq!((killer.kills, killer.score), (1, 100), "peer {id}");
        assert_eq!(victim.deaths, 1, "peer {id}");
    }
    assert!(m.peer(2).arena.local_entity().is_none());
    assert_eq!(m.peer(1).arena.spawner().live_count(), 2);

    // The victim asks again after the respawn delay.
    m.run_for(secs(2.0));
    assert!(m.peer(2).arena.local_entity().is_none());
    m.run_for(secs(1.5));
    let respawned = m.peer(2).arena.local_entity().map(|e| e.id());
    assert!(respawned.is_some());
    assert_ne!(respawned, Some(victim_entity));
    assert_eq!(m.peer(3).arena.registry().len(), 3);
}

#[test]
fn test_lethal_damage_twice_counts_one_death() {
    let mut m = Match::new();
    m.join(1);
    m.join(2);
    m.run_for(secs(2.5));

    let victim_entity = m.peer(2).arena.local_entity().map(|e| e.id()).unwrap();
    for _ in 0..2 {
        m.peer_mut(1).outbox.reliable(
            Recipient::Participant(p(2)),
            GameMessage::Damage {
                entity: victim_entity,
                amount: 150.0,
                attacker: p(1),
            },
        );
    }
    m.deliver();

    let board = m.peer(1).arena.board();
    assert_eq!(board.get(p(2)).map(|r| r.deaths), Some(1));
    assert_eq!(board.get(p(1)).map(|r| r.kills), Some(1));
}

#[test]
fn test_steering_into_opponent_lands_damage() {
    let mut m = Match::new();
    m.join(1);
    m.join(2);
    m.run_for(secs(2.1));

    let target = m.peer(1).arena.local_entity().map(|e| e.position()).unwrap();
    let start = m.peer(2).arena.local_entity().map(|e| e.position()).unwrap();
    m.peer_mut(2).arena.steer(target - start);
    m.run_for(secs(2.0));

    let health = m.peer(1).arena.local_entity().map(|e| e.health()).unwrap();
    assert!(health < 100.0, "no damage landed");
    assert!(health > 0.0);
    assert!(m.peer(1).arena.board().get(p(1)).is_some_and(|r| r.deaths == 0));
}
