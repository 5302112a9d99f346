//! Authority-side entity creation.
//!
//! Only the authority spawns. Every path into a spawn (a participant
//! entering, a `SpawnRequest`, its broadcast fallback, a deferred retry)
//! goes through [`AuthoritySpawner::request_spawn`], whose existence
//! check is the one place duplicates are filtered:
//!
//! ```text
//! request_spawn(p)
//!   ├─ p not in session      → NotInSession
//!   ├─ p has a live entity   → AlreadyLive      (idempotent)
//!   ├─ pool exhausted        → Deferred         (retried on a timer)
//!   └─ otherwise             → Spawned          (EntitySpawned → All)
//! ```
//!
//! The authority handles one message at a time on its update loop, so
//! the check and the insert cannot interleave.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use topspin_protocol::{EntityId, ParticipantId, Recipient};
use topspin_session::{Outbox, SessionContext};
use topspin_tick::{TimerQueue, TimerToken};
use tracing::{debug, info, warn};

use crate::{ArenaConfig, ArenaError, EntityRecord, EntityRegistry, SpawnPointPool};

/// What happened to a spawn request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpawnOutcome {
    /// A new entity was created and announced.
    Spawned(EntityRecord),
    /// The participant already has this live entity.
    AlreadyLive(EntityId),
    /// No spawn point is free; the spawn will be retried.
    Deferred,
    /// The participant is not in the session.
    NotInSession,
}

/// Creates one entity per participant and hands it to its owner.
pub struct AuthoritySpawner {
    pool: SpawnPointPool,
    live: BTreeMap<ParticipantId, EntityRecord>,
    deferred: BTreeSet<ParticipantId>,
    next_serial: u32,
    health: f32,
    retry_interval: Duration,
    timers: TimerQueue<()>,
    retry: Option<TimerToken>,
}

impl AuthoritySpawner {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            pool: SpawnPointPool::new(&config.spawn),
            live: BTreeMap::new(),
            deferred: BTreeSet::new(),
            next_serial: 1,
            health: config.combat.max_health,
            retry_interval: config.spawn.spawn_retry_interval,
            timers: TimerQueue::new(),
            retry: None,
        }
    }

    /// Uses an explicit pool, e.g. one with a seeded random source.
    pub fn with_pool(config: &ArenaConfig, pool: SpawnPointPool) -> Self {
        Self {
            pool,
            ..Self::new(config)
        }
    }

    /// Spawns an entity for `participant` unless it already has one.
    ///
    /// # Errors
    /// [`ArenaError::NotAuthority`] if the local participant is not the
    /// authority.
    pub fn request_spawn(
        &mut self,
        ctx: &SessionContext,
        participant: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) -> Result<SpawnOutcome, ArenaError> {
        let Some(authority) = ctx.local_id().filter(|_| ctx.is_authority()) else {
            return Err(ArenaError::NotAuthority("spawn entities"));
        };
        if !ctx.roster().contains(participant) {
            debug!(%participant, "spawn request for participant not in session");
            self.deferred.remove(&participant);
            return Ok(SpawnOutcome::NotInSession);
        }
        if let Some(existing) = self.live.get(&participant) {
            debug!(%participant, entity = %existing.entity, "duplicate spawn request");
            return Ok(SpawnOutcome::AlreadyLive(existing.entity));
        }

        let Some(allocation) = self.pool.allocate(participant) else {
            if self.deferred.insert(participant) {
                warn!(%participant, "spawn deferred, no free spawn point");
            }
            self.arm_retry(now);
            return Ok(SpawnOutcome::Deferred);
        };
        self.deferred.remove(&participant);

        let record = EntityRecord {
            entity: EntityId::compose(authority, self.next_serial),
            owner: participant,
            spawn_point: allocation.index,
            position: allocation.point.position,
            rotation: allocation.point.rotation,
            health: self.health,
        };
        self.next_serial += 1;
        self.live.insert(participant, record);
        outbox.reliable(Recipient::All, record.to_message());
        info!(
            %participant,
            entity = %record.entity,
            spawn_point = record.spawn_point,
            "entity spawned"
        );
        Ok(SpawnOutcome::Spawned(record))
    }

    /// Handles a newcomer: spawns its entity and replays every other live
    /// entity to it.
    pub fn on_participant_entered(
        &mut self,
        ctx: &SessionContext,
        participant: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) -> Result<SpawnOutcome, ArenaError> {
        self.replay_for(participant, outbox);
        self.request_spawn(ctx, participant, outbox, now)
    }

    /// Sends `EntitySpawned` for every live entity not owned by
    /// `participant` to `participant` only.
    pub fn replay_for(&self, participant: ParticipantId, outbox: &mut Outbox) {
        let mut replayed = 0;
        for record in self.live.values().filter(|r| r.owner != participant) {
            outbox.reliable(Recipient::Participant(participant), record.to_message());
            replayed += 1;
        }
        if replayed > 0 {
            debug!(%participant, replayed, "replayed live entities");
        }
    }

    /// The owner destroyed `entity`. Frees its spawn point.
    pub fn on_entity_destroyed(&mut self, entity: EntityId, owner: ParticipantId) -> bool {
        match self.live.get(&owner) {
            Some(record) if record.entity == entity => {
                self.live.remove(&owner);
                self.pool.release(owner);
                debug!(%owner, %entity, "entity retired");
                true
            }
            _ => false,
        }
    }

    /// Forgets everything about a departed participant. Returns its live
    /// entity, if it had one.
    pub fn on_participant_left(&mut self, participant: ParticipantId) -> Option<EntityRecord> {
        self.deferred.remove(&participant);
        self.pool.release(participant);
        self.live.remove(&participant)
    }

    /// Retries deferred spawns whose timer is due. Call once per frame.
    pub fn tick(
        &mut self,
        ctx: &SessionContext,
        outbox: &mut Outbox,
        now: Duration,
    ) -> Vec<SpawnOutcome> {
        if self.timers.drain_due(now).is_empty() {
            return Vec::new();
        }
        self.retry = None;
        if !ctx.is_authority() {
            return Vec::new();
        }
        let pending: Vec<ParticipantId> = self.deferred.iter().copied().collect();
        let mut outcomes = Vec::with_capacity(pending.len());
        for participant in pending {
            match self.request_spawn(ctx, participant, outbox, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => warn!(%participant, error = %e, "deferred spawn failed"),
            }
        }
        outcomes
    }

    /// Rebuilds authority state from the entities observed while not being
    /// the authority. Spawn points come from the entities themselves.
    pub fn rebuild_from(&mut self, registry: &EntityRegistry) {
        self.reset();
        for record in registry.iter() {
            if let Err(e) = self.pool.assign(record.owner, record.spawn_point) {
                warn!(entity = %record.entity, error = %e, "cannot restore spawn point");
            }
            self.live.insert(record.owner, *record);
        }
        info!(live = self.live.len(), "spawner rebuilt from observed entities");
    }

    /// Drops all state, e.g. after losing authority.
    pub fn reset(&mut self) {
        self.live.clear();
        self.deferred.clear();
        self.pool.reset();
        self.timers.clear();
        self.retry = None;
    }

    pub fn live_entity(&self, participant: ParticipantId) -> Option<&EntityRecord> {
        self.live.get(&participant)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    pub fn pool(&self) -> &SpawnPointPool {
        &self.pool
    }

    fn arm_retry(&mut self, now: Duration) {
        if self.retry.is_none() {
            self.retry = Some(self.timers.schedule(now + self.retry_interval, ()));
        }
    }
}
