//! Gameplay layer for Topspin: spawning, replication, combat and scoring.
//!
//! # Who does what
//!
//! | Component | Runs on | Job |
//! |---|---|---|
//! | [`AuthoritySpawner`] + [`SpawnPointPool`] | authority | one live entity per participant |
//! | [`SpawnRequester`] | every client | ask for an entity until one arrives |
//! | [`ReplicatedEntityChannel`] | every client | publish own state, ease toward others' |
//! | [`CollisionResolver`] | every client | commit hits made by the own entity |
//! | [`ScoreLedger`] | authority | the one true score table |
//! | [`ScoreBoard`] | every client | mirror of the last score broadcasts |
//!
//! [`Arena`] bundles them for one participant and routes every session
//! event and [`GameMessage`](topspin_protocol::GameMessage) to its
//! handler. Components never do I/O: they read a
//! [`SessionContext`](topspin_session::SessionContext) and write to an
//! [`Outbox`](topspin_session::Outbox).

mod arena;
mod collision;
mod config;
mod entity;
mod error;
mod registry;
mod replication;
mod requester;
mod score;
mod spawn_pool;
mod spawner;

pub use arena::Arena;
pub use collision::{Body, CollisionResolver, CollisionResult, ContactSkip, Impact, detect_contact};
pub use config::{
    AllocationPolicy, ArenaConfig, CombatConfig, ReplicationConfig, ScoreConfig, SpawnConfig,
    SpawnPoint,
};
pub use entity::{DamageOutcome, Death, IgnoreReason, OwnedEntity, Steering};
pub use error::ArenaError;
pub use registry::{EntityRecord, EntityRegistry, RegistryChange};
pub use replication::{RemoteEntityView, ReplicatedEntityChannel, SpinEdge};
pub use requester::{RequesterState, SpawnRequester};
pub use score::{DeathOutcome, ScoreBoard, ScoreLedger, ScoreRecord};
pub use spawn_pool::{Allocation, SpawnPointPool};
pub use spawner::{AuthoritySpawner, SpawnOutcome};
