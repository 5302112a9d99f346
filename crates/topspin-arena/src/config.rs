//! Arena configuration.
//!
//! Every tunable of the gameplay layer lives here, grouped by the
//! component that reads it. All structs deserialize with
//! `#[serde(default)]`, so a config file only needs the fields it changes.

use std::time::Duration;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// ArenaConfig
// ---------------------------------------------------------------------------

/// Top-level gameplay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub spawn: SpawnConfig,
    pub combat: CombatConfig,
    pub replication: ReplicationConfig,
    pub score: ScoreConfig,
}

impl ArenaConfig {
    /// Clamps values that would break the simulation. Logs each fix.
    pub fn validated(mut self) -> Self {
        if self.spawn.spawn_points.is_empty() {
            warn!("no spawn points configured, using the default ring");
            self.spawn.spawn_points = SpawnPoint::ring(8, 8.0);
        }
        if self.combat.max_health <= 0.0 {
            warn!(max_health = self.combat.max_health, "max_health must be positive");
            self.combat.max_health = CombatConfig::default().max_health;
        }
        if self.replication.snapshot_rate_hz == 0 {
            warn!("snapshot_rate_hz is 0, using 1");
            self.replication.snapshot_rate_hz = 1;
        }
        self.replication.position_lerp_speed = self.replication.position_lerp_speed.max(0.0);
        self.replication.rotation_slerp_speed = self.replication.rotation_slerp_speed.max(0.0);
        self.replication.health_epsilon = self.replication.health_epsilon.max(0.0);
        self.combat.min_knockback = self.combat.min_knockback.max(0.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Spawning
// ---------------------------------------------------------------------------

/// A fixed world position entities can spawn at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub position: Vec3,
    pub rotation: Quat,
}

impl SpawnPoint {
    /// `count` points evenly spaced on a circle of `radius`, each facing
    /// the centre.
    pub fn ring(count: usize, radius: f32) -> Vec<Self> {
        (0..count)
            .map(|i| {
                let angle = i as f32 / count as f32 * std::f32::consts::TAU;
                let position = Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius);
                let facing = (-position).normalize_or_zero();
                let yaw = facing.x.atan2(facing.z);
                Self {
                    position,
                    rotation: Quat::from_rotation_y(yaw),
                }
            })
            .collect()
    }
}

/// How the pool picks among available spawn points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Uniformly random among the available points.
    #[default]
    Random,
    /// The next available point after the last one handed out.
    RoundRobin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnConfig {
    pub allocation_policy: AllocationPolicy,
    pub spawn_points: Vec<SpawnPoint>,
    /// Seed for random allocation. `None` seeds from the OS.
    pub seed: Option<u64>,
    /// How often the authority retries spawns deferred by an exhausted pool.
    pub spawn_retry_interval: Duration,
    /// How often an unanswered spawn request is re-sent.
    pub spawn_request_retry: Duration,
    /// How long a requester keeps re-sending before giving up.
    pub spawn_request_timeout: Duration,
    /// Pause after giving up before the requester tries again.
    pub spawn_request_window: Duration,
    /// Delay between a local death and the next spawn request.
    pub respawn_delay: Duration,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            allocation_policy: AllocationPolicy::Random,
            spawn_points: SpawnPoint::ring(8, 8.0),
            seed: None,
            spawn_retry_interval: Duration::from_secs(1),
            spawn_request_retry: Duration::from_millis(500),
            spawn_request_timeout: Duration::from_secs(2),
            spawn_request_window: Duration::from_secs(3),
            respawn_delay: Duration::from_secs(3),
        }
    }
}

// ---------------------------------------------------------------------------
// Combat and movement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Contacts with a relative speed below this are ignored.
    pub min_collision_force: f32,
    pub damage_multiplier: f32,
    /// Applied when the acting entity is spinning.
    pub spin_multiplier: f32,
    /// Applied on top when both entities are spinning.
    pub clash_multiplier: f32,
    pub knockback_factor: f32,
    /// Floor for knockback magnitude.
    pub min_knockback: f32,
    /// Damage is ignored this long after a spawn.
    pub spawn_immunity: Duration,
    /// The same pair of entities cannot trade hits more often than this.
    pub contact_cooldown: Duration,
    /// A death counts as a kill if the last hit landed within this window.
    pub attribution_window: Duration,
    pub max_health: f32,

    pub entity_radius: f32,
    /// Entities outside this radius (on the XZ plane) fall.
    pub arena_radius: f32,
    /// Falling below this height is an environmental death.
    pub kill_height: f32,
    pub acceleration: f32,
    pub max_speed: f32,
    /// Fraction of horizontal velocity lost per second.
    pub damping: f32,
    pub gravity: f32,
    /// Spin rate (rad/s) while spinning.
    pub spin_rate: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            min_collision_force: 2.0,
            damage_multiplier: 1.0,
            spin_multiplier: 2.0,
            clash_multiplier: 1.5,
            knockback_factor: 0.5,
            min_knockback: 2.0,
            spawn_immunity: Duration::from_secs(2),
            contact_cooldown: Duration::from_millis(500),
            attribution_window: Duration::from_secs(5),
            max_health: 100.0,
            entity_radius: 0.5,
            arena_radius: 12.0,
            kill_height: -5.0,
            acceleration: 14.0,
            max_speed: 9.0,
            damping: 1.5,
            gravity: 9.81,
            spin_rate: 12.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Snapshots per second sent for each owned entity.
    pub snapshot_rate_hz: u32,
    /// Exponential smoothing rate for remote positions (1/s).
    pub position_lerp_speed: f32,
    /// Smoothing rate for remote rotations (1/s).
    pub rotation_slerp_speed: f32,
    /// Longest frame step the smoothing will integrate in one go.
    pub max_frame_dt: Duration,
    /// Remote entities further than this from their target jump to it.
    pub snap_distance: f32,
    /// Smallest health difference applied from a snapshot.
    pub health_epsilon: f32,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            snapshot_rate_hz: 20,
            position_lerp_speed: 10.0,
            rotation_slerp_speed: 15.0,
            max_frame_dt: Duration::from_millis(100),
            snap_distance: 4.0,
            health_epsilon: 0.01,
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Score awarded to the attacker for a kill.
    pub kill_bonus: u32,
    /// Repeated death reports for one victim within this window count once.
    pub death_debounce: Duration,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            kill_bonus: 100,
            death_debounce: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_points_face_centre() {
        let points = SpawnPoint::ring(4, 5.0);
        assert_eq!(points.len(), 4);
        for p in points {
            assert!((p.position.length() - 5.0).abs() < 1e-4);
            let forward = p.rotation * Vec3::Z;
            let to_centre = (-p.position).normalize();
            assert!(forward.dot(to_centre) > 0.999);
        }
    }

    #[test]
    fn test_validated_restores_empty_spawn_points() {
        let mut config = ArenaConfig::default();
        config.spawn.spawn_points.clear();
        config.replication.snapshot_rate_hz = 0;
        let config = config.validated();
        assert_eq!(config.spawn.spawn_points.len(), 8);
        assert_eq!(config.replication.snapshot_rate_hz, 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ArenaConfig =
            serde_json::from_str(r#"{ "score": { "kill_bonus": 50 } }"#).unwrap();
        assert_eq!(config.score.kill_bonus, 50);
        assert_eq!(config.score.death_debounce, Duration::from_secs(1));
        assert_eq!(config.combat.max_health, 100.0);
    }
}
