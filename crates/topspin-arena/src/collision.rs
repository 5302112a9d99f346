//! Contact detection and combat resolution.
//!
//! Every client runs contact detection, but a client only commits the
//! outcome for its own entity acting on the opponent: it deals the damage
//! its entity causes and takes its own knockback. Two owners that both see
//! the contact therefore each commit one direction of it, and no hit is
//! counted twice.
//!
//! ```text
//! force   = |v_self - v_opponent|                 (ignored below min_collision_force)
//! damage  = force × damage_multiplier
//!             × spin_multiplier    if self is spinning
//!             × clash_multiplier   if both are spinning
//! push    = max(force × knockback_factor, min_knockback)
//! self    ← normalize(p_self - p_opponent) × push      (applied locally)
//! opponent← normalize(p_opponent - p_self) × push      (sent with the damage)
//! ```

use std::collections::HashMap;
use std::time::Duration;

use glam::Vec3;
use topspin_protocol::{EntityId, GameMessage, ParticipantId, Recipient};
use topspin_session::Outbox;
use tracing::{debug, trace};

use crate::{CombatConfig, DamageOutcome, OwnedEntity};

/// The physical state of one side of a contact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub entity: EntityId,
    pub owner: ParticipantId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub spinning: bool,
}

impl Body {
    pub fn of(entity: &OwnedEntity) -> Self {
        Self {
            entity: entity.id(),
            owner: entity.owner(),
            position: entity.position(),
            velocity: entity.velocity(),
            spinning: entity.is_spinning(),
        }
    }
}

/// Whether two entities of radius `radius` overlap.
pub fn detect_contact(a: &Body, b: &Body, radius: f32) -> bool {
    a.position.distance_squared(b.position) <= (2.0 * radius) * (2.0 * radius)
}

/// The computed result of one contact, from the acting entity's side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Impact {
    pub force: f32,
    /// Damage dealt to the opponent.
    pub damage: f32,
    pub knockback: f32,
    /// Unit vector pushing the acting entity away from the opponent.
    pub self_direction: Vec3,
    /// Unit vector pushing the opponent away from the acting entity.
    pub opponent_direction: Vec3,
}

/// Why a contact produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactSkip {
    /// Relative speed under the threshold.
    Incidental,
    /// This pair already traded hits within the cooldown.
    Cooldown,
    /// The acting entity is dead.
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CollisionResult {
    Skipped(ContactSkip),
    Resolved(Impact),
}

/// Computes combat outcomes and turns them into messages.
pub struct CollisionResolver {
    config: CombatConfig,
    /// Opponent entity → when we last resolved a contact with it.
    last_contact: HashMap<EntityId, Duration>,
}

impl CollisionResolver {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            last_contact: HashMap::new(),
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// The outcome of `actor` hitting `opponent`, or `None` for an
    /// incidental touch.
    pub fn compute(&self, actor: &Body, opponent: &Body) -> Option<Impact> {
        let force = (actor.velocity - opponent.velocity).length();
        if force < self.config.min_collision_force {
            return None;
        }

        let mut damage = force * self.config.damage_multiplier;
        if actor.spinning {
            damage *= self.config.spin_multiplier;
            if opponent.spinning {
                damage *= self.config.clash_multiplier;
            }
        }

        let away = actor.position - opponent.position;
        // Coincident centres: push apart along the approach direction.
        let self_direction = away
            .try_normalize()
            .or_else(|| (opponent.velocity - actor.velocity).try_normalize())
            .unwrap_or(Vec3::X);

        Some(Impact {
            force,
            damage,
            knockback: (force * self.config.knockback_factor).max(self.config.min_knockback),
            self_direction,
            opponent_direction: -self_direction,
        })
    }

    /// Resolves a contact between the local `entity` and `opponent`.
    ///
    /// Applies the self-knockback immediately and queues the damage and
    /// the opponent's knockback for the opponent's owner.
    pub fn resolve(
        &mut self,
        entity: &mut OwnedEntity,
        opponent: &Body,
        outbox: &mut Outbox,
        now: Duration,
    ) -> CollisionResult {
        if entity.is_dead() {
            return CollisionResult::Skipped(ContactSkip::Dead);
        }
        if self.in_cooldown(opponent.entity, now) {
            return CollisionResult::Skipped(ContactSkip::Cooldown);
        }
        let actor = Body::of(entity);
        let Some(impact) = self.compute(&actor, opponent) else {
            trace!(entity = %actor.entity, opponent = %opponent.entity, "incidental contact");
            return CollisionResult::Skipped(ContactSkip::Incidental);
        };
        self.last_contact.insert(opponent.entity, now);

        entity.apply_knockback(impact.self_direction, impact.knockback);
        let to = Recipient::Participant(opponent.owner);
        outbox.reliable(
            to,
            GameMessage::Damage {
                entity: opponent.entity,
                amount: impact.damage,
                attacker: actor.owner,
            },
        );
        outbox.reliable(
            to,
            GameMessage::Knockback {
                entity: opponent.entity,
                source: actor.entity,
                direction: impact.opponent_direction,
                magnitude: impact.knockback,
            },
        );
        debug!(
            entity = %actor.entity,
            opponent = %opponent.entity,
            force = impact.force,
            damage = impact.damage,
            "contact resolved"
        );
        CollisionResult::Resolved(impact)
    }

    /// Applies incoming damage to the local entity and, if it landed,
    /// queues impact feedback for observers.
    pub fn on_damage(
        &self,
        entity: &mut OwnedEntity,
        amount: f32,
        attacker: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) -> DamageOutcome {
        let outcome = entity.apply_damage(amount, Some(attacker), now, &self.config);
        if matches!(outcome, DamageOutcome::Applied { .. } | DamageOutcome::Died { .. }) {
            outbox.unreliable(
                Recipient::AllExcept(entity.owner()),
                GameMessage::ImpactFeedback {
                    entity: entity.id(),
                    position: entity.position(),
                    intensity: (amount / entity.max_health()).clamp(0.0, 1.0),
                },
            );
        }
        outcome
    }

    /// Applies incoming knockback unless this client already resolved the
    /// same contact and took its own knockback for it. Returns `true` if
    /// applied.
    pub fn on_knockback(
        &self,
        entity: &mut OwnedEntity,
        source: EntityId,
        direction: Vec3,
        magnitude: f32,
        now: Duration,
    ) -> bool {
        if self.in_cooldown(source, now) {
            trace!(entity = %entity.id(), %source, "knockback already applied locally");
            return false;
        }
        entity.apply_knockback(direction, magnitude);
        true
    }

    /// Forgets cooldowns involving `entity`.
    pub fn forget(&mut self, entity: EntityId) {
        self.last_contact.remove(&entity);
    }

    /// Forgets all cooldowns.
    pub fn clear(&mut self) {
        self.last_contact.clear();
    }

    fn in_cooldown(&self, opponent: EntityId, now: Duration) -> bool {
        self.last_contact
            .get(&opponent)
            .is_some_and(|at| now.saturating_sub(*at) < self.config.contact_cooldown)
    }
}

#[cfg(test)]
mod tests {
    use glam::Quat;

    use super::*;
    use crate::EntityRecord;

    fn body(id: u32, position: Vec3, velocity: Vec3, spinning: bool) -> Body {
        Body {
            entity: EntityId::compose(ParticipantId(1), id),
            owner: ParticipantId(id),
            position,
            velocity,
            spinning,
        }
    }

    fn config() -> CombatConfig {
        CombatConfig {
            damage_multiplier: 1.0,
            spin_multiplier: 2.0,
            clash_multiplier: 1.5,
            ..CombatConfig::default()
        }
    }

    #[test]
    fn test_compute_below_threshold_is_incidental() {
        let resolver = CollisionResolver::new(config());
        let a = body(1, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), true);
        let b = body(2, Vec3::X, Vec3::ZERO, false);
        assert!(resolver.compute(&a, &b).is_none());
    }

    #[test]
    fn test_compute_plain_hit() {
        let resolver = CollisionResolver::new(config());
        let a = body(1, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), false);
        let b = body(2, Vec3::X, Vec3::ZERO, false);
        let impact = resolver.compute(&a, &b).unwrap();
        assert!((impact.damage - 10.0).abs() < 1e-5);
    }

    #[test]
    fn test_compute_clash_applies_both_multipliers() {
        let resolver = CollisionResolver::new(config());
        let a = body(1, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), true);
        let b = body(2, Vec3::X, Vec3::ZERO, true);
        let impact = resolver.compute(&a, &b).unwrap();
        assert!((impact.damage - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_compute_knockback_directions_mirror() {
        let resolver = CollisionResolver::new(config());
        let a = body(1, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), false);
        let b = body(2, Vec3::new(0.8, 0.0, 0.0), Vec3::ZERO, false);
        let impact = resolver.compute(&a, &b).unwrap();
        assert!(impact.self_direction.abs_diff_eq(-Vec3::X, 1e-5));
        assert!(impact.opponent_direction.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn test_compute_weak_hit_gets_minimum_knockback() {
        let cfg = CombatConfig {
            knockback_factor: 0.1,
            min_knockback: 2.0,
            ..config()
        };
        let resolver = CollisionResolver::new(cfg);
        let a = body(1, Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), false);
        let b = body(2, Vec3::X, Vec3::ZERO, false);
        assert_eq!(resolver.compute(&a, &b).unwrap().knockback, 2.0);
    }

    #[test]
    fn test_detect_contact_uses_both_radii() {
        let a = body(1, Vec3::ZERO, Vec3::ZERO, false);
        let b = body(2, Vec3::new(0.9, 0.0, 0.0), Vec3::ZERO, false);
        let c = body(3, Vec3::new(1.1, 0.0, 0.0), Vec3::ZERO, false);
        assert!(detect_contact(&a, &b, 0.5));
        assert!(!detect_contact(&a, &c, 0.5));
    }

    #[test]
    fn test_resolve_respects_contact_cooldown() {
        let mut resolver = CollisionResolver::new(config());
        let record = EntityRecord {
            entity: EntityId::compose(ParticipantId(1), 1),
            owner: ParticipantId(1),
            spawn_point: 0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            health: 100.0,
        };
        let mut entity = OwnedEntity::spawn(&record, 100.0, Duration::ZERO);
        entity.apply_knockback(Vec3::X, 10.0);
        let opponent = body(2, Vec3::new(0.8, 0.0, 0.0), Vec3::ZERO, false);
        let mut outbox = Outbox::new();

        let first = resolver.resolve(&mut entity, &opponent, &mut outbox, Duration::from_secs(3));
        assert!(matches!(first, CollisionResult::Resolved(_)));
        assert_eq!(outbox.drain().len(), 2);

        let again = resolver.resolve(
            &mut entity,
            &opponent,
            &mut outbox,
            Duration::from_millis(3_100),
        );
        assert_eq!(again, CollisionResult::Skipped(ContactSkip::Cooldown));
        assert!(outbox.is_empty());
    }
}
