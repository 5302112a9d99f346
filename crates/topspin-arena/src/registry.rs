//! Every participant's record of which entities are live.

use std::collections::{BTreeMap, HashMap};

use glam::{Quat, Vec3};
use topspin_protocol::{EntityId, GameMessage, ParticipantId};
use tracing::debug;

/// What `EntitySpawned` announced about an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRecord {
    pub entity: EntityId,
    pub owner: ParticipantId,
    pub spawn_point: usize,
    pub position: Vec3,
    pub rotation: Quat,
    pub health: f32,
}

impl EntityRecord {
    /// The `EntitySpawned` message announcing this entity.
    pub fn to_message(&self) -> GameMessage {
        GameMessage::EntitySpawned {
            entity: self.entity,
            owner: self.owner,
            spawn_point: self.spawn_point,
            position: self.position,
            rotation: self.rotation,
            health: self.health,
        }
    }

    /// Reads an `EntitySpawned` message.
    pub fn from_message(message: &GameMessage) -> Option<Self> {
        match *message {
            GameMessage::EntitySpawned {
                entity,
                owner,
                spawn_point,
                position,
                rotation,
                health,
            } => Some(Self {
                entity,
                owner,
                spawn_point,
                position,
                rotation,
                health,
            }),
            _ => None,
        }
    }
}

/// How [`EntityRegistry::insert`] changed the registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegistryChange {
    /// A new entity.
    Inserted,
    /// The entity was already known. Nothing changed.
    Duplicate,
    /// The owner's previous entity was dropped in favour of this one.
    Replaced(EntityId),
}

/// Live entities keyed by id and by owner. Holds at most one entity per
/// owner.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    by_entity: BTreeMap<EntityId, EntityRecord>,
    by_owner: HashMap<ParticipantId, EntityId>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a spawned entity.
    ///
    /// If the owner already has a different entity, the older one is
    /// dropped. That happens when a destroy notice from the owner is
    /// overtaken by the authority's next spawn.
    pub fn insert(&mut self, record: EntityRecord) -> RegistryChange {
        if self.by_entity.contains_key(&record.entity) {
            return RegistryChange::Duplicate;
        }
        let change = match self.by_owner.insert(record.owner, record.entity) {
            Some(previous) if previous != record.entity => {
                self.by_entity.remove(&previous);
                debug!(owner = %record.owner, %previous, replacement = %record.entity, "replacing stale entity");
                RegistryChange::Replaced(previous)
            }
            _ => RegistryChange::Inserted,
        };
        self.by_entity.insert(record.entity, record);
        change
    }

    /// Drops an entity.
    pub fn remove(&mut self, entity: EntityId) -> Option<EntityRecord> {
        let record = self.by_entity.remove(&entity)?;
        if self.by_owner.get(&record.owner) == Some(&entity) {
            self.by_owner.remove(&record.owner);
        }
        Some(record)
    }

    /// Drops whatever entity `owner` has.
    pub fn remove_owner(&mut self, owner: ParticipantId) -> Option<EntityRecord> {
        let entity = self.by_owner.remove(&owner)?;
        self.by_entity.remove(&entity)
    }

    pub fn get(&self, entity: EntityId) -> Option<&EntityRecord> {
        self.by_entity.get(&entity)
    }

    /// The live entity owned by `owner`.
    pub fn entity_of(&self, owner: ParticipantId) -> Option<EntityId> {
        self.by_owner.get(&owner).copied()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.by_entity.contains_key(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRecord> {
        self.by_entity.values()
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_owner.clear();
    }
}
