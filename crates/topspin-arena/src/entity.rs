//! The locally owned entity.
//!
//! Only the owner holds an [`OwnedEntity`]; it is the single writer of
//! the entity's authoritative state. Everyone else sees the entity through
//! a [`RemoteEntityView`](crate::RemoteEntityView).

use std::time::Duration;

use glam::{Quat, Vec3};
use topspin_protocol::{EntityId, EntitySnapshot, GameMessage, ParticipantId, Recipient};
use topspin_session::Outbox;
use tracing::{debug, info};

use crate::{CombatConfig, EntityRecord};

/// Result of applying damage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DamageOutcome {
    /// The damage had no effect.
    Ignored(IgnoreReason),
    /// Health dropped but the entity survives.
    Applied { health: f32 },
    /// Health reached zero. Returned exactly once per entity.
    Died { killer: Option<ParticipantId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Inside the spawn immunity window.
    Immune,
    /// Already dead.
    Dead,
    /// Zero, negative or non-finite amount.
    Invalid,
}

/// A completed death transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Death {
    /// The participant credited with the kill; `None` for an
    /// environmental death.
    pub killer: Option<ParticipantId>,
}

/// Movement intent for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Steering {
    /// Desired direction on the XZ plane; normalised internally.
    pub direction: Vec3,
}

/// An entity driven by the local participant.
#[derive(Debug, Clone)]
pub struct OwnedEntity {
    id: EntityId,
    owner: ParticipantId,
    spawn_point: usize,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    health: f32,
    max_health: f32,
    spinning: bool,
    spin_rate: f32,
    spawned_at: Duration,
    steering: Steering,
    last_attacker: Option<(ParticipantId, Duration)>,
    dead: bool,
}

impl OwnedEntity {
    /// Takes ownership of a freshly spawned entity.
    pub fn spawn(record: &EntityRecord, max_health: f32, now: Duration) -> Self {
        Self {
            id: record.entity,
            owner: record.owner,
            spawn_point: record.spawn_point,
            position: record.position,
            rotation: record.rotation,
            velocity: Vec3::ZERO,
            health: record.health.clamp(0.0, max_health),
            max_health,
            spinning: false,
            spin_rate: 0.0,
            spawned_at: now,
            steering: Steering::default(),
            last_attacker: None,
            dead: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    pub fn spawn_point(&self) -> usize {
        self.spawn_point
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn spawned_at(&self) -> Duration {
        self.spawned_at
    }

    pub fn set_steering(&mut self, steering: Steering) {
        self.steering = steering;
    }

    /// Starts or stops spinning. Returns `true` on a change.
    pub fn set_spinning(&mut self, spinning: bool) -> bool {
        let changed = self.spinning != spinning;
        self.spinning = spinning;
        changed
    }

    /// Whether damage is suppressed at `now`.
    pub fn is_immune(&self, now: Duration, immunity: Duration) -> bool {
        now.saturating_sub(self.spawned_at) < immunity
    }

    /// Applies `amount` damage. Health is clamped to `[0, max]` and the
    /// transition to zero happens once.
    pub fn apply_damage(
        &mut self,
        amount: f32,
        attacker: Option<ParticipantId>,
        now: Duration,
        config: &CombatConfig,
    ) -> DamageOutcome {
        if self.dead {
            return DamageOutcome::Ignored(IgnoreReason::Dead);
        }
        if !amount.is_finite() || amount <= 0.0 {
            return DamageOutcome::Ignored(IgnoreReason::Invalid);
        }
        if self.is_immune(now, config.spawn_immunity) {
            debug!(entity = %self.id, amount, "damage ignored, spawn immunity");
            return DamageOutcome::Ignored(IgnoreReason::Immune);
        }
        if let Some(attacker) = attacker {
            self.last_attacker = Some((attacker, now));
        }
        self.health = (self.health - amount).clamp(0.0, self.max_health);
        if self.health <= 0.0 {
            match self.kill(now, config.attribution_window) {
                Some(death) => DamageOutcome::Died {
                    killer: death.killer,
                },
                None => DamageOutcome::Ignored(IgnoreReason::Dead),
            }
        } else {
            DamageOutcome::Applied {
                health: self.health,
            }
        }
    }

    /// Adds an impulse along `direction`.
    pub fn apply_knockback(&mut self, direction: Vec3, magnitude: f32) {
        if self.dead || !magnitude.is_finite() {
            return;
        }
        self.velocity += direction.normalize_or_zero() * magnitude;
    }

    /// Runs the death transition, crediting the last attacker if it hit
    /// within `attribution_window`. Returns `None` if the entity was
    /// already dead.
    pub fn kill(&mut self, now: Duration, attribution_window: Duration) -> Option<Death> {
        if self.dead {
            return None;
        }
        self.dead = true;
        self.health = 0.0;
        self.spinning = false;
        let killer = self
            .last_attacker
            .filter(|(_, at)| now.saturating_sub(*at) <= attribution_window)
            .map(|(p, _)| p);
        info!(entity = %self.id, killer = ?killer, "entity died");
        Some(Death { killer })
    }

    /// Advances movement by `dt`. Returns the death if the entity fell
    /// below the kill height during this step.
    pub fn integrate(
        &mut self,
        dt: Duration,
        now: Duration,
        config: &CombatConfig,
    ) -> Option<Death> {
        if self.dead {
            return None;
        }
        let dt = dt.as_secs_f32();

        let steer = Vec3::new(self.steering.direction.x, 0.0, self.steering.direction.z)
            .normalize_or_zero();
        self.velocity += steer * config.acceleration * dt;

        let horizontal = Vec3::new(self.velocity.x, 0.0, self.velocity.z);
        let damped = horizontal * (1.0 - config.damping * dt).max(0.0);
        let clamped = damped.clamp_length_max(config.max_speed);
        self.velocity.x = clamped.x;
        self.velocity.z = clamped.z;

        let flat_distance = Vec3::new(self.position.x, 0.0, self.position.z).length();
        if flat_distance > config.arena_radius || self.position.y < 0.0 {
            self.velocity.y -= config.gravity * dt;
        } else {
            self.velocity.y = 0.0;
            self.position.y = 0.0;
        }

        self.position += self.velocity * dt;

        self.spin_rate = if self.spinning { config.spin_rate } else { 0.0 };
        if self.spin_rate > 0.0 {
            self.rotation = (Quat::from_rotation_y(self.spin_rate * dt) * self.rotation).normalize();
        } else if steer != Vec3::ZERO {
            self.rotation = Quat::from_rotation_y(steer.x.atan2(steer.z));
        }

        if self.position.y < config.kill_height {
            return self.kill(now, config.attribution_window);
        }
        None
    }

    /// The replicated state.
    pub fn snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            entity: self.id,
            position: self.position,
            rotation: self.rotation,
            spinning: self.spinning,
            health: self.health,
            spin_rate: self.spin_rate,
            velocity: self.velocity,
        }
    }

    /// Queues the final messages of a dead entity: the death report to the
    /// authority, then the destroy notice to everyone. The owner drops the
    /// entity only after these are flushed.
    pub fn report_death(&self, killer: Option<ParticipantId>, outbox: &mut Outbox) {
        outbox.reliable(
            Recipient::Authority,
            GameMessage::DeathReport {
                killer,
                victim: self.owner,
                victim_entity: self.id,
            },
        );
        outbox.reliable(
            Recipient::All,
            GameMessage::EntityDestroyed {
                entity: self.id,
                owner: self.owner,
            },
        );
    }
}
