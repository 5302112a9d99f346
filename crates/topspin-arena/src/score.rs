//! Scores: the authority's ledger and everyone's mirror of it.
//!
//! Only the authority mutates a [`ScoreLedger`]. Every mutation is
//! followed by a `ScoreUpdate` and a `StatsUpdate` broadcast for each
//! participant it touched, and every client (the authority included, via
//! the relay echo) applies those to its [`ScoreBoard`].
//!
//! Counters only ever increase, so scores are monotonic within a session.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use topspin_protocol::{GameMessage, ParticipantId, Recipient};
use topspin_session::{Outbox, SessionContext};
use tracing::{debug, info};

use crate::{ArenaError, ScoreConfig};

/// One participant's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: u32,
    pub kills: u32,
    pub deaths: u32,
}

/// What a death report did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathOutcome {
    /// Killer credited, victim's deaths incremented.
    Kill {
        killer: ParticipantId,
        victim: ParticipantId,
    },
    /// Only the victim's deaths incremented.
    Unattributed { victim: ParticipantId },
    /// A report for this victim was already counted within the debounce
    /// window. Nothing changed.
    Debounced,
}

// ---------------------------------------------------------------------------
// ScoreLedger
// ---------------------------------------------------------------------------

/// The authoritative score table.
pub struct ScoreLedger {
    config: ScoreConfig,
    records: BTreeMap<ParticipantId, ScoreRecord>,
    last_death: HashMap<ParticipantId, Duration>,
}

impl ScoreLedger {
    pub fn new(config: ScoreConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
            last_death: HashMap::new(),
        }
    }

    /// Seeds a ledger from the last broadcast values, for a participant
    /// that just became the authority.
    pub fn from_board(config: ScoreConfig, board: &ScoreBoard) -> Self {
        let mut ledger = Self::new(config);
        ledger.records = board.records.clone();
        ledger
    }

    /// Makes sure `participant` has a record. New records are broadcast.
    pub fn register(&mut self, participant: ParticipantId, outbox: &mut Outbox) {
        if self.records.contains_key(&participant) {
            return;
        }
        self.records.insert(participant, ScoreRecord::default());
        self.broadcast(participant, outbox);
    }

    /// Counts a death.
    ///
    /// A report naming a killer other than the victim is a kill; anything
    /// else only counts a death. Reports for a victim within
    /// `death_debounce` of the previous counted one are dropped.
    ///
    /// # Errors
    /// [`ArenaError::NotAuthority`] unless the local participant is the
    /// authority.
    pub fn record_death(
        &mut self,
        ctx: &SessionContext,
        killer: Option<ParticipantId>,
        victim: ParticipantId,
        outbox: &mut Outbox,
        now: Duration,
    ) -> Result<DeathOutcome, ArenaError> {
        if !ctx.is_authority() {
            return Err(ArenaError::NotAuthority("record deaths"));
        }
        if let Some(previous) = self.last_death.get(&victim) {
            if now.saturating_sub(*previous) < self.config.death_debounce {
                debug!(%victim, "duplicate death report debounced");
                return Ok(DeathOutcome::Debounced);
            }
        }
        self.last_death.insert(victim, now);

        self.records.entry(victim).or_default().deaths += 1;
        let outcome = match killer.filter(|k| *k != victim) {
            Some(killer) => {
                let record = self.records.entry(killer).or_default();
                record.kills += 1;
                record.score = record.score.saturating_add(self.config.kill_bonus);
                self.broadcast(killer, outbox);
                info!(%killer, %victim, "kill recorded");
                DeathOutcome::Kill { killer, victim }
            }
            None => {
                info!(%victim, "death recorded");
                DeathOutcome::Unattributed { victim }
            }
        };
        self.broadcast(victim, outbox);
        Ok(outcome)
    }

    /// Sends the whole table to one participant, e.g. a late joiner.
    pub fn replay_for(&self, participant: ParticipantId, outbox: &mut Outbox) {
        for (&id, record) in &self.records {
            let to = Recipient::Participant(participant);
            outbox.reliable(to, score_update(id, record));
            outbox.reliable(to, stats_update(id, record));
        }
    }

    pub fn record(&self, participant: ParticipantId) -> Option<&ScoreRecord> {
        self.records.get(&participant)
    }

    pub fn records(&self) -> impl Iterator<Item = (ParticipantId, &ScoreRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    fn broadcast(&self, participant: ParticipantId, outbox: &mut Outbox) {
        if let Some(record) = self.records.get(&participant) {
            outbox.reliable(Recipient::All, score_update(participant, record));
            outbox.reliable(Recipient::All, stats_update(participant, record));
        }
    }
}

fn score_update(participant: ParticipantId, record: &ScoreRecord) -> GameMessage {
    GameMessage::ScoreUpdate {
        participant,
        score: record.score,
    }
}

fn stats_update(participant: ParticipantId, record: &ScoreRecord) -> GameMessage {
    GameMessage::StatsUpdate {
        participant,
        kills: record.kills,
        deaths: record.deaths,
    }
}

// ---------------------------------------------------------------------------
// ScoreBoard
// ---------------------------------------------------------------------------

/// A read-only mirror of the ledger built from broadcasts.
#[derive(Debug, Clone, Default)]
pub struct ScoreBoard {
    records: BTreeMap<ParticipantId, ScoreRecord>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a score broadcast. Returns `false` for other messages.
    pub fn apply(&mut self, message: &GameMessage) -> bool {
        match *message {
            GameMessage::ScoreUpdate { participant, score } => {
                self.records.entry(participant).or_default().score = score;
                true
            }
            GameMessage::StatsUpdate {
                participant,
                kills,
                deaths,
            } => {
                let record = self.records.entry(participant).or_default();
                record.kills = kills;
                record.deaths = deaths;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, participant: ParticipantId) -> Option<&ScoreRecord> {
        self.records.get(&participant)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParticipantId, &ScoreRecord)> {
        self.records.iter().map(|(id, r)| (*id, r))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
