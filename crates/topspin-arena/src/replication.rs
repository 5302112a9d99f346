//! Snapshot publishing and remote-entity reconciliation.
//!
//! The owner publishes its entity's state at a bounded rate on the
//! unreliable channel. Observers never write those fields; each keeps a
//! [`RemoteEntityView`] that eases toward the newest snapshot:
//!
//! - position: exponential smoothing, `alpha = 1 - e^(-speed·dt)`, with
//!   `dt` clamped so a long hitch cannot overshoot; snaps if far off
//! - rotation: slerp with its own, faster rate
//! - spinning: edge-triggered, reported once per change
//! - health: overwritten immediately when it differs by more than epsilon
//!
//! Snapshots carry no sequence number; the latest one received wins.

use std::collections::BTreeMap;
use std::time::Duration;

use glam::{Quat, Vec3};
use topspin_protocol::{EntityId, EntitySnapshot, GameMessage, ParticipantId, Recipient};
use topspin_session::Outbox;
use topspin_tick::Cadence;
use tracing::debug;

use crate::{EntityRecord, OwnedEntity, ReplicationConfig};

/// A change of an entity's spinning flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinEdge {
    Started,
    Stopped,
}

// ---------------------------------------------------------------------------
// RemoteEntityView
// ---------------------------------------------------------------------------

/// An observer's picture of an entity it does not own.
#[derive(Debug, Clone)]
pub struct RemoteEntityView {
    entity: EntityId,
    owner: ParticipantId,
    position: Vec3,
    rotation: Quat,
    velocity: Vec3,
    health: f32,
    spin_rate: f32,
    spinning: bool,
    target_position: Vec3,
    target_rotation: Quat,
    last_snapshot: Option<Duration>,
}

impl RemoteEntityView {
    /// Starts tracking a spawned entity at its spawn transform.
    pub fn new(record: &EntityRecord) -> Self {
        Self {
            entity: record.entity,
            owner: record.owner,
            position: record.position,
            rotation: record.rotation,
            velocity: Vec3::ZERO,
            health: record.health,
            spin_rate: 0.0,
            spinning: false,
            target_position: record.position,
            target_rotation: record.rotation,
            last_snapshot: None,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn owner(&self) -> ParticipantId {
        self.owner
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

    pub fn spin_rate(&self) -> f32 {
        self.spin_rate
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning
    }

    /// Loop time of the last applied snapshot.
    pub fn last_snapshot(&self) -> Option<Duration> {
        self.last_snapshot
    }

    /// Takes in a snapshot. Returns the spin edge it caused, if any.
    pub fn apply(
        &mut self,
        snapshot: &EntitySnapshot,
        config: &ReplicationConfig,
        now: Duration,
    ) -> Option<SpinEdge> {
        self.target_position = snapshot.position;
        self.target_rotation = snapshot.rotation.normalize();
        self.velocity = snapshot.velocity;
        self.spin_rate = snapshot.spin_rate;
        if (snapshot.health - self.health).abs() > config.health_epsilon {
            self.health = snapshot.health;
        }
        self.last_snapshot = Some(now);

        let edge = match (self.spinning, snapshot.spinning) {
            (false, true) => Some(SpinEdge::Started),
            (true, false) => Some(SpinEdge::Stopped),
            _ => None,
        };
        self.spinning = snapshot.spinning;
        edge
    }

    /// Eases toward the last snapshot by one frame of `dt`.
    pub fn interpolate(&mut self, dt: Duration, config: &ReplicationConfig) {
        let dt = dt.min(config.max_frame_dt).as_secs_f32();

        if self.position.distance(self.target_position) > config.snap_distance {
            self.position = self.target_position;
        } else {
            let alpha = 1.0 - (-config.position_lerp_speed * dt).exp();
            self.position = self.position.lerp(self.target_position, alpha);
        }

        let alpha = 1.0 - (-config.rotation_slerp_speed * dt).exp();
        self.rotation = self.rotation.slerp(self.target_rotation, alpha).normalize();
    }
}

// ---------------------------------------------------------------------------
// ReplicatedEntityChannel
// ---------------------------------------------------------------------------

/// Publishes the owned entity and reconciles every remote one.
pub struct ReplicatedEntityChannel {
    config: ReplicationConfig,
    cadence: Cadence,
    remotes: BTreeMap<EntityId, RemoteEntityView>,
}

impl ReplicatedEntityChannel {
    pub fn new(config: ReplicationConfig) -> Self {
        let cadence = Cadence::from_rate_hz(config.snapshot_rate_hz);
        Self {
            config,
            cadence,
            remotes: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Queues a snapshot of `entity` if the send cadence allows. Returns
    /// `true` if one was queued.
    pub fn publish(&mut self, entity: &OwnedEntity, outbox: &mut Outbox, now: Duration) -> bool {
        if !self.cadence.ready(now) {
            return false;
        }
        outbox.unreliable(
            Recipient::AllExcept(entity.owner()),
            GameMessage::Snapshot(entity.snapshot()),
        );
        true
    }

    /// Publishes on the next call regardless of cadence, e.g. right after a
    /// spawn or a spin toggle.
    pub fn publish_soon(&mut self) {
        self.cadence.reset();
    }

    /// Starts observing a remote entity. Returns `false` if already tracked.
    pub fn track(&mut self, record: &EntityRecord) -> bool {
        if self.remotes.contains_key(&record.entity) {
            return false;
        }
        self.remotes.insert(record.entity, RemoteEntityView::new(record));
        true
    }

    pub fn untrack(&mut self, entity: EntityId) -> Option<RemoteEntityView> {
        self.remotes.remove(&entity)
    }

    /// Applies a received snapshot. Snapshots for unknown entities are
    /// dropped: they raced the spawn notice or trail a destroy.
    pub fn apply(&mut self, snapshot: &EntitySnapshot, now: Duration) -> Option<SpinEdge> {
        let Some(view) = self.remotes.get_mut(&snapshot.entity) else {
            debug!(entity = %snapshot.entity, "snapshot for unknown entity");
            return None;
        };
        view.apply(snapshot, &self.config, now)
    }

    /// Advances every remote view by one frame.
    pub fn interpolate(&mut self, dt: Duration) {
        for view in self.remotes.values_mut() {
            view.interpolate(dt, &self.config);
        }
    }

    pub fn view(&self, entity: EntityId) -> Option<&RemoteEntityView> {
        self.remotes.get(&entity)
    }

    pub fn views(&self) -> impl Iterator<Item = &RemoteEntityView> {
        self.remotes.values()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn clear(&mut self) {
        self.remotes.clear();
        self.cadence.reset();
    }
}
