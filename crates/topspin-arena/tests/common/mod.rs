//! An in-process match: several participants and a routing loop standing
//! in for the relay. Time only moves when a test calls `step`.

#![allow(dead_code)]

use std::time::Duration;

use topspin_arena::{AllocationPolicy, Arena, ArenaConfig};
use topspin_protocol::{GameMessage, ParticipantId, ParticipantInfo, Recipient, SessionId};
use topspin_session::{Outbox, SessionConfig, SessionContext, SessionCoordinator, SessionEvent};

pub const FRAME: Duration = Duration::from_micros(16_667);

pub fn p(id: u32) -> ParticipantId {
    ParticipantId(id)
}

pub fn info(id: u32) -> ParticipantInfo {
    ParticipantInfo {
        id: p(id),
        display_name: format!("bot-{id}"),
    }
}

pub fn arena_config() -> ArenaConfig {
    let mut config = ArenaConfig::default();
    config.spawn.allocation_policy = AllocationPolicy::RoundRobin;
    config.spawn.seed = Some(11);
    config
}

pub struct Peer {
    pub id: ParticipantId,
    pub coord: SessionCoordinator,
    pub ctx: SessionContext,
    pub arena: Arena,
    pub outbox: Outbox,
}

pub struct Match {
    pub peers: Vec<Peer>,
    pub authority: Option<ParticipantId>,
    pub now: Duration,
    pub config: ArenaConfig,
    /// Messages dropped instead of delivered (by kind), for fault tests.
    pub drop_kinds: Vec<&'static str>,
    pub delivered: Vec<(ParticipantId, ParticipantId, GameMessage)>,
}

impl Match {
    pub fn new() -> Self {
        Self::with_config(arena_config())
    }

    pub fn with_config(config: ArenaConfig) -> Self {
        Self {
            peers: Vec::new(),
            authority: None,
            now: Duration::ZERO,
            config,
            drop_kinds: Vec::new(),
            delivered: Vec::new(),
        }
    }

    /// Adds a participant. The first one creates the session and holds
    /// authority.
    pub fn join(&mut self, id: u32) {
        let session_config = SessionConfig::default();
        let mut coord = SessionCoordinator::new(session_config.clone());
        let mut ctx = SessionContext::new(session_config);
        coord.connect(self.now).unwrap();
        coord.handle(
            &mut ctx,
            &SessionEvent::Connected {
                participant_id: p(id),
            },
            self.now,
        );
        let authority = *self.authority.get_or_insert(p(id));
        let mut participants: Vec<ParticipantInfo> =
            self.peers.iter().map(|peer| info(peer.id.0)).collect();
        participants.push(info(id));
        let change = coord.handle(
            &mut ctx,
            &SessionEvent::SessionJoined {
                session_id: SessionId(1),
                name: "arena-test".into(),
                participants,
                authority,
                max_participants: 4,
            },
            self.now,
        );
        coord.take_commands();

        let mut arena = Arena::new(self.config.clone());
        let mut outbox = Outbox::new();
        arena.on_session_joined(&ctx, &mut outbox, self.now);
        arena.on_role_change(&ctx, change, &mut outbox);

        let now = self.now;
        for peer in &mut self.peers {
            peer.coord
                .handle(&mut peer.ctx, &SessionEvent::ParticipantEntered(info(id)), now);
            peer.arena
                .on_participant_entered(&peer.ctx, p(id), &mut peer.outbox, now);
        }
        self.peers.push(Peer {
            id: p(id),
            coord,
            ctx,
            arena,
            outbox,
        });
    }

    /// Removes a participant without any goodbye messages, like a dropped
    /// connection. If it held authority, the lowest remaining id takes
    /// over before the departure is announced.
    pub fn drop_participant(&mut self, id: u32) {
        self.peers.retain(|peer| peer.id != p(id));
        let now = self.now;
        if self.authority == Some(p(id)) {
            self.authority = self.peers.iter().map(|peer| peer.id).min();
            if let Some(next) = self.authority {
                for peer in &mut self.peers {
                    let change = peer.coord.handle(
                        &mut peer.ctx,
                        &SessionEvent::AuthorityChanged(next),
                        now,
                    );
                    peer.arena.on_role_change(&peer.ctx, change, &mut peer.outbox);
                }
            }
        }
        for peer in &mut self.peers {
            peer.coord
                .handle(&mut peer.ctx, &SessionEvent::ParticipantLeft(p(id)), now);
            peer.arena
                .on_participant_left(&peer.ctx, p(id), &mut peer.outbox, now);
        }
    }

    /// Routes queued messages until every outbox is empty.
    pub fn deliver(&mut self) {
        loop {
            let mut batch = Vec::new();
            for peer in &mut self.peers {
                for out in peer.outbox.drain() {
                    batch.push((peer.id, out));
                }
            }
            if batch.is_empty() {
                break;
            }
            for (from, out) in batch {
                if self.drop_kinds.contains(&out.message.kind()) {
                    continue;
                }
                let targets: Vec<ParticipantId> = self
                    .peers
                    .iter()
                    .map(|peer| peer.id)
                    .filter(|&id| match out.to {
                        Recipient::All => true,
                        Recipient::AllExcept(except) => id != except,
                        Recipient::Participant(target) => id == target,
                        Recipient::Authority => Some(id) == self.authority,
                    })
                    .collect();
                let now = self.now;
                for target in targets {
                    self.delivered.push((from, target, out.message.clone()));
                    if let Some(peer) = self.peers.iter_mut().find(|peer| peer.id == target) {
                        peer.arena
                            .on_message(&peer.ctx, from, &out.message, &mut peer.outbox, now);
                    }
                }
            }
        }
        let now = self.now;
        for peer in &mut self.peers {
            peer.arena.after_flush(now);
        }
    }

    /// Advances one frame of `dt` on every participant, then delivers.
    pub fn step(&mut self, dt: Duration) {
        self.now += dt;
        let now = self.now;
        for peer in &mut self.peers {
            peer.coord.tick(&mut peer.ctx, now);
            peer.arena.frame(&peer.ctx, dt, now, &mut peer.outbox);
        }
        self.deliver();
    }

    /// Steps frames until `until` has elapsed.
    pub fn run_for(&mut self, until: Duration) {
        let end = self.now + until;
        while self.now < end {
            self.step(FRAME);
        }
    }

    pub fn peer(&self, id: u32) -> &Peer {
        self.peers
            .iter()
            .find(|peer| peer.id == p(id))
            .expect("no such peer")
    }

    pub fn peer_mut(&mut self, id: u32) -> &mut Peer {
        self.peers
            .iter_mut()
            .find(|peer| peer.id == p(id))
            .expect("no such peer")
    }
}
