//! Error types for the arena layer.

use topspin_protocol::{EntityId, ParticipantId};

/// Errors from arena operations.
///
/// Recoverable gameplay conditions (an exhausted pool, a duplicate spawn
/// request, a debounced death) are outcome values, not errors. These
/// variants are for inputs that are simply wrong.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The spawn point index is outside the configured set.
    #[error("spawn point {0} does not exist")]
    UnknownSpawnPoint(usize),

    /// The spawn point is held by another participant.
    #[error("spawn point {index} is allocated to {owner}")]
    SpawnPointTaken { index: usize, owner: ParticipantId },

    /// No such live entity.
    #[error("entity {0} not found")]
    UnknownEntity(EntityId),

    /// The operation is reserved for the session authority.
    #[error("only the authority may {0}")]
    NotAuthority(&'static str),
}
