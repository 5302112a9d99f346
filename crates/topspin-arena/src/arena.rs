//! One participant's whole gameplay state, and the dispatch of every
//! session event and game message to the component that handles it.
//!
//! The client runtime owns one [`Arena`] and calls into it from its single
//! update loop. Each [`GameMessage`] kind has exactly one handler arm in
//! [`Arena::on_message`]; authority-only handlers check
//! [`SessionContext::is_authority`] first.

use std::time::Duration;

use glam::Vec3;
use topspin_protocol::{EntityId, GameMessage, ParticipantId, Recipient};
use topspin_session::{Outbox, RoleChange, SessionContext};
use tracing::{debug, info, trace, warn};

use crate::{
    ArenaConfig, AuthoritySpawner, Body, CollisionResolver, DamageOutcome, Death, EntityRecord,
    EntityRegistry, OwnedEntity, RegistryChange, ReplicatedEntityChannel, ScoreBoard,
    ScoreLedger, SpawnOutcome, SpawnRequester, Steering, detect_contact,
};

/// Gameplay state for the local participant.
pub struct Arena {
    config: ArenaConfig,
    registry: EntityRegistry,
    local: Option<OwnedEntity>,
    /// Our dead entity, kept until its final messages are flushed.
    dying: Option<OwnedEntity>,
    channel: ReplicatedEntityChannel,
    resolver: CollisionResolver,
    requester: SpawnRequester,
    spawner: AuthoritySpawner,
    /// Present only while we hold authority.
    ledger: Option<ScoreLedger>,
    board: ScoreBoard,
    steering: Steering,
    spinning: bool,
}

impl Arena {
    pub fn new(config: ArenaConfig) -> Self {
        let config = config.validated();
        let spawner = AuthoritySpawner::new(&config);
        Self::with_spawner(config, spawner)
    }

    /// Uses a prepared spawner, e.g. one with a seeded pool.
    pub fn with_spawner(config: ArenaConfig, spawner: AuthoritySpawner) -> Self {
        Self {
            registry: EntityRegistry::new(),
            local: None,
            dying: None,
            channel: ReplicatedEntityChannel::new(config.replication.clone()),
            resolver: CollisionResolver::new(config.combat.clone()),
            requester: SpawnRequester::new(&config.spawn),
            spawner,
            ledger: None,
            board: ScoreBoard::new(),
            steering: Steering::default(),
            spinning: false,
            config,
        }
    }

    // -- session lifecycle --------------------------------------------------

    /// We just entered a session: start from a clean slate and ask for an
    /// entity.
    pub fn on_session_joined(&mut self, ctx: &SessionContext, outbox: &mut Outbox, now: Duration) {
        self.reset();
        self.requester.request(ctx, &self.registry, outbox, now);
    }

    /// We left the session or lost the connection.
    pub fn on_session_left(&mut self) {
        self.reset();
    }

    /// Reacts to gaining or losing authority.
    pub fn on_role_change(
        &mut self,
        ctx: &SessionContext,
        change: RoleChange,
        outbox: &mut Outbox,
    ) {
        match change {
            RoleChange::Promoted => {
                self.spawner.rebuild_from(&self.registry);
                let mut ledger = ScoreLedger::from_board(self.config.score.clone(), &self.board);
                for participant in ctx.roster().ids() {
                    ledger.register(participant, outbox);
                }
                self.ledger = Some(ledger);
                info!(entities = self.registry.len(), "took over authority");
            }
            RoleChange::Demoted => {
                self.spawner.reset();
                self.ledger = None;
                info!("authority handed over");
            }
            RoleChange::Unchanged => {}
        }
    }

    pub fn on_participant_entered(
        &mut self,
        ctx: &SessionContext,
        participant: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) {
        if !ctx.is_authority() {
            return;
        }
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.register(participant, outbox);
            ledger.replay_for(participant, outbox);
        }
        if let Err(e) = self.spawner.on_participant_entered(ctx, participant, outbox, now) {
            warn!(%participant, error = %e, "spawn for newcomer failed");
        }
    }

    /// Drops the participant's entity. On the authority, a participant that
    /// leaves with a live entity is counted as an unattributed death.
    pub fn on_participant_left(
        &mut self,
        ctx: &SessionContext,
        participant: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) {
        if let Some(record) = self.registry.remove_owner(participant) {
            self.forget_entity(record.entity);
        }
        if !ctx.is_authority() {
            return;
        }
        let had_entity = self.spawner.on_participant_left(participant).is_some();
        if had_entity {
            if let Some(ledger) = self.ledger.as_mut() {
                if let Err(e) = ledger.record_death(ctx, None, participant, outbox, now) {
                    warn!(%participant, error = %e, "cannot record departure");
                }
            }
        }
    }

    // -- messages -----------------------------------------------------------

    /// Handles one game message from `from`.
    pub fn on_message(
        &mut self,
        ctx: &SessionContext,
        from: ParticipantId,
        message: &GameMessage,
        outbox: &mut Outbox,
        now: Duration,
    ) {
        match *message {
            GameMessage::SpawnRequest { requesting }
            | GameMessage::SpawnRequestBroadcast { requesting } => {
                if !ctx.is_authority() {
                    return;
                }
                // Participants only ask for themselves.
                if requesting != from {
                    debug!(%from, %requesting, "dropping spawn request for another participant");
                    return;
                }
                match self.spawner.request_spawn(ctx, requesting, outbox, now) {
                    // The requester missed the announcement; send it again.
                    Ok(SpawnOutcome::AlreadyLive(_)) => {
                        if let Some(record) = self.spawner.live_entity(requesting) {
                            outbox.reliable(Recipient::Participant(requesting), record.to_message());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%requesting, error = %e, "spawn request failed"),
                }
            }
            GameMessage::EntitySpawned { .. } => {
                if let Some(record) = EntityRecord::from_message(message) {
                    self.on_entity_spawned(ctx, record, now);
                }
            }
            GameMessage::EntityDestroyed { entity, owner } => {
                if self.registry.remove(entity).is_some() {
                    self.forget_entity(entity);
                }
                if ctx.is_authority() {
                    self.spawner.on_entity_destroyed(entity, owner);
                }
            }
            GameMessage::Snapshot(ref snapshot) => {
                if ctx.is_local(from) {
                    return;
                }
                if let Some(edge) = self.channel.apply(snapshot, now) {
                    trace!(entity = %snapshot.entity, ?edge, "spin changed");
                }
            }
            GameMessage::Damage {
                entity,
                amount,
                attacker,
            } => {
                let Some(local) = self.local.as_mut().filter(|e| e.id() == entity) else {
                    debug!(%entity, "damage for an entity we do not own");
                    return;
                };
                let outcome = self.resolver.on_damage(local, amount, attacker, outbox, now);
                if let DamageOutcome::Died { killer } = outcome {
                    self.begin_death(Death { killer }, outbox, now);
                }
            }
            GameMessage::Knockback {
                entity,
                source,
                direction,
                magnitude,
            } => {
                if let Some(local) = self.local.as_mut().filter(|e| e.id() == entity) {
                    self.resolver
                        .on_knockback(local, source, direction, magnitude, now);
                }
            }
            GameMessage::ImpactFeedback {
                entity, intensity, ..
            } => {
                trace!(%entity, intensity, "impact");
            }
            GameMessage::DeathReport { killer, victim, .. } => {
                if !ctx.is_authority() {
                    return;
                }
                if let Some(ledger) = self.ledger.as_mut() {
                    if let Err(e) = ledger.record_death(ctx, killer, victim, outbox, now) {
                        warn!(%victim, error = %e, "cannot record death");
                    }
                }
            }
            GameMessage::ScoreUpdate { .. } | GameMessage::StatsUpdate { .. } => {
                self.board.apply(message);
            }
        }
    }

    // -- per frame ----------------------------------------------------------

    /// Runs one frame of gameplay.
    pub fn frame(&mut self, ctx: &SessionContext, dt: Duration, now: Duration, outbox: &mut Outbox) {
        if !ctx.in_session() {
            return;
        }
        self.requester.tick(ctx, &self.registry, outbox, now);
        if ctx.is_authority() {
            self.spawner.tick(ctx, outbox, now);
        }

        let death = match self.local.as_mut() {
            Some(local) => {
                local.set_steering(self.steering);
                local.set_spinning(self.spinning);
                local.integrate(dt, now, &self.config.combat)
            }
            None => None,
        };
        if let Some(death) = death {
            self.begin_death(death, outbox, now);
        }

        if let Some(local) = self.local.as_mut() {
            let radius = self.config.combat.entity_radius;
            let actor = Body::of(local);
            let opponents: Vec<Body> = self
                .channel
                .views()
                .filter(|view| view.owner() != actor.owner)
                .map(|view| Body {
                    entity: view.entity(),
                    owner: view.owner(),
                    position: view.position(),
                    velocity: view.velocity(),
                    spinning: view.is_spinning(),
                })
                .filter(|body| detect_contact(&actor, body, radius))
                .collect();
            for opponent in opponents {
                self.resolver.resolve(local, &opponent, outbox, now);
            }
            self.channel.publish(local, outbox, now);
        }

        self.channel.interpolate(dt);
    }

    /// Drops our dead entity once its final messages left the outbox, and
    /// schedules the respawn request.
    pub fn after_flush(&mut self, now: Duration) {
        if let Some(dead) = self.dying.take() {
            debug!(entity = %dead.id(), "entity destroyed");
            self.requester
                .request_after(self.config.spawn.respawn_delay, now);
        }
    }

    // -- input --------------------------------------------------------------

    pub fn steer(&mut self, direction: Vec3) {
        self.steering = Steering { direction };
    }

    pub fn set_spinning(&mut self, spinning: bool) {
        if self.spinning != spinning {
            self.spinning = spinning;
            self.channel.publish_soon();
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn local_entity(&self) -> Option<&OwnedEntity> {
        self.local.as_ref()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn channel(&self) -> &ReplicatedEntityChannel {
        &self.channel
    }

    pub fn board(&self) -> &ScoreBoard {
        &self.board
    }

    /// The authoritative ledger, if we hold authority.
    pub fn ledger(&self) -> Option<&ScoreLedger> {
        self.ledger.as_ref()
    }

    pub fn spawner(&self) -> &AuthoritySpawner {
        &self.spawner
    }

    pub fn requester(&self) -> &SpawnRequester {
        &self.requester
    }

    // -- internals ----------------------------------------------------------

    fn on_entity_spawned(&mut self, ctx: &SessionContext, record: EntityRecord, now: Duration) {
        match self.registry.insert(record) {
            RegistryChange::Duplicate => return,
            RegistryChange::Replaced(previous) => self.forget_entity(previous),
            RegistryChange::Inserted => {}
        }

        if ctx.is_local(record.owner) {
            self.local = Some(OwnedEntity::spawn(
                &record,
                self.config.combat.max_health,
                now,
            ));
            self.channel.publish_soon();
            self.requester.on_entity_spawned(ctx, record.owner);
            info!(entity = %record.entity, spawn_point = record.spawn_point, "own entity spawned");
        } else {
            self.channel.track(&record);
        }
    }

    fn begin_death(&mut self, death: Death, outbox: &mut Outbox, now: Duration) {
        let Some(dead) = self.local.take() else {
            return;
        };
        dead.report_death(death.killer, outbox);
        self.registry.remove(dead.id());
        self.resolver.clear();
        debug!(entity = %dead.id(), at_ms = now.as_millis() as u64, "death reported");
        self.dying = Some(dead);
    }

    fn forget_entity(&mut self, entity: EntityId) {
        self.channel.untrack(entity);
        self.resolver.forget(entity);
        if self.local.as_ref().is_some_and(|e| e.id() == entity) {
            self.local = None;
        }
    }

    fn reset(&mut self) {
        self.registry.clear();
        self.local = None;
        self.dying = None;
        self.channel.clear();
        self.resolver.clear();
        self.requester.cancel();
        self.spawner.reset();
        self.ledger = None;
        self.board.clear();
    }
}
