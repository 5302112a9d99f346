//! # Topspin
//!
//! Multiplayer arena sessions over a relay.
//!
//! Participants connect to a [`Relay`](topspin_relay::Relay), find or
//! create a session, and play a spinning-top arena in which one
//! participant holds authority over spawning and scoring while every
//! participant owns and simulates its own entity.
//!
//! This meta-crate re-exports the layers and adds the client runtime that
//! ties them together:
//!
//! | Layer | Crate |
//! |---|---|
//! | transport | `topspin-transport` |
//! | wire format | `topspin-protocol` |
//! | update loop, timers | `topspin-tick` |
//! | session lifecycle | `topspin-session` |
//! | gameplay | `topspin-arena` |
//! | relay server | `topspin-relay` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use topspin::prelude::*;
//!
//! # async fn run() -> Result<(), TopspinError> {
//! topspin::init_logging();
//!
//! let client = ArenaClient::spawn(
//!     ClientConfig::default(),
//!     WebSocketConnector::new("ws://127.0.0.1:7400"),
//! );
//! client.steer(Vec3::X)?;
//! client.set_spinning(true)?;
//! println!("{}", client.view().status);
//! client.shutdown().await
//! # }
//! ```

mod client;
mod error;
mod link;

pub use client::{ArenaClient, ClientConfig, ClientHandle, ClientView, EntityView};
pub use error::TopspinError;

pub use topspin_arena as arena;
pub use topspin_protocol as protocol;
pub use topspin_relay as relay;
pub use topspin_session as session;
pub use topspin_tick as tick;
pub use topspin_transport as transport;

/// Installs a `tracing` subscriber that honours `RUST_LOG` and defaults to
/// `info`. Safe to call more than once; later calls do nothing.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub mod prelude {
    pub use glam::{Quat, Vec3};

    pub use crate::{ArenaClient, ClientConfig, ClientHandle, ClientView, EntityView, TopspinError};
    pub use topspin_arena::{Arena, ArenaConfig, ScoreRecord, SpawnPoint};
    pub use topspin_protocol::{EntityId, ParticipantId, SessionId};
    pub use topspin_relay::{Relay, RelayConfig, RelayHandle};
    pub use topspin_session::{CoordinatorState, SessionConfig};
    pub use topspin_transport::{
        Connector, MemoryConnector, WebSocketConnector, memory_transport,
    };
}
