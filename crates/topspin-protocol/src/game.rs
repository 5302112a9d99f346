//! Game-level messages exchanged between participants.
//!
//! These ride inside [`Payload::Route`](crate::Payload::Route) as bytes
//! produced by the [`Codec`](crate::Codec). The relay only ever sees the
//! bytes; participants decode them into [`GameMessage`].
//!
//! | Message | Sent by | Addressed to | Channel |
//! |---|---|---|---|
//! | `SpawnRequest` | any participant | authority | reliable |
//! | `SpawnRequestBroadcast` | any participant | all | reliable (fallback) |
//! | `EntitySpawned` | authority | all / late joiner | reliable |
//! | `EntityDestroyed` | entity owner | all | reliable |
//! | `Snapshot` | entity owner | all but owner | unreliable |
//! | `Damage`, `Knockback` | attacker's owner | victim's owner | reliable |
//! | `ImpactFeedback` | victim's owner | all but owner | unreliable |
//! | `DeathReport` | dying entity's owner | authority | reliable |
//! | `ScoreUpdate`, `StatsUpdate` | authority | all | reliable |

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{EntityId, ParticipantId};

/// One replicated state update for an entity.
///
/// Field order is part of the wire contract: position, rotation, spinning,
/// health, spin rate, velocity. Snapshots carry no sequence number; the
/// newest one received always wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity: EntityId,
    pub position: Vec3,
    pub rotation: Quat,
    pub spinning: bool,
    pub health: f32,
    pub spin_rate: f32,
    pub velocity: Vec3,
}

/// Every message participants send each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GameMessage {
    /// "Please spawn an entity for me." Idempotent at the authority.
    SpawnRequest { requesting: ParticipantId },

    /// Same request, broadcast to everyone because the sender could not
    /// address the authority yet. Only the authority acts on it.
    SpawnRequestBroadcast { requesting: ParticipantId },

    /// The authority created `entity` at spawn point `spawn_point` and
    /// handed ownership to `owner`.
    EntitySpawned {
        entity: EntityId,
        owner: ParticipantId,
        spawn_point: usize,
        position: Vec3,
        rotation: Quat,
        health: f32,
    },

    /// The owner destroyed its entity (death or leave).
    EntityDestroyed {
        entity: EntityId,
        owner: ParticipantId,
    },

    /// Periodic owner → observers state update.
    Snapshot(EntitySnapshot),

    /// Damage dealt to `entity` by `attacker`.
    Damage {
        entity: EntityId,
        amount: f32,
        attacker: ParticipantId,
    },

    /// Knockback to apply to `entity`, caused by contact with `source`.
    Knockback {
        entity: EntityId,
        source: EntityId,
        direction: Vec3,
        magnitude: f32,
    },

    /// Cosmetic hit feedback (camera shake, sparks) redistributed by the
    /// victim's owner after it applied a hit.
    ImpactFeedback {
        entity: EntityId,
        position: Vec3,
        intensity: f32,
    },

    /// "My entity died." `killer` is `None` for environmental deaths.
    DeathReport {
        killer: Option<ParticipantId>,
        victim: ParticipantId,
        victim_entity: EntityId,
    },

    /// Authoritative score for one participant. Overwrite semantics.
    ScoreUpdate {
        participant: ParticipantId,
        score: u32,
    },

    /// Authoritative kill/death counters for one participant.
    StatsUpdate {
        participant: ParticipantId,
        kills: u32,
        deaths: u32,
    },
}

impl GameMessage {
    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SpawnRequest { .. } => "SpawnRequest",
            Self::SpawnRequestBroadcast { .. } => "SpawnRequestBroadcast",
            Self::EntitySpawned { .. } => "EntitySpawned",
            Self::EntityDestroyed { .. } => "EntityDestroyed",
            Self::Snapshot(_) => "Snapshot",
            Self::Damage { .. } => "Damage",
            Self::Knockback { .. } => "Knockback",
            Self::ImpactFeedback { .. } => "ImpactFeedback",
            Self::DeathReport { .. } => "DeathReport",
            Self::ScoreUpdate { .. } => "ScoreUpdate",
            Self::StatsUpdate { .. } => "StatsUpdate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_keeps_field_order() {
        let snap = EntitySnapshot {
            entity: EntityId::compose(ParticipantId(1), 1),
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            spinning: true,
            health: 80.0,
            spin_rate: 12.5,
            velocity: Vec3::ZERO,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let order = [
            "\"position\"",
            "\"rotation\"",
            "\"spinning\"",
            "\"health\"",
            "\"spin_rate\"",
            "\"velocity\"",
        ];
        let offsets: Vec<usize> =
            order.iter().map(|key| json.find(key).unwrap()).collect();
        assert!(offsets.windows(2).all(|w| w[0] < w[1]), "{json}");
    }

    #[test]
    fn test_snapshot_vectors_are_plain_float_arrays() {
        let snap = EntitySnapshot {
            entity: EntityId(1),
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            spinning: false,
            health: 100.0,
            spin_rate: 0.0,
            velocity: Vec3::X,
        };
        let json = serde_json::to_value(snap).unwrap();
        assert_eq!(json["position"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(json["rotation"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_death_report_without_killer_is_null() {
        let msg = GameMessage::DeathReport {
            killer: None,
            victim: ParticipantId(2),
            victim_entity: EntityId(7),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "DeathReport");
        assert!(json["killer"].is_null());
    }

    #[test]
    fn test_game_message_kind_matches_tag() {
        let msg = GameMessage::SpawnRequest {
            requesting: ParticipantId(3),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], msg.kind());
    }
}
