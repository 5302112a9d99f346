//! The relay that connects Topspin clients.
//!
//! The relay is the only server in a match and it knows nothing about the
//! game. It assigns participant ids, groups participants into session
//! rooms, picks the authority, and forwards game bytes to whoever they are
//! addressed to. Each room runs as an isolated Tokio task (actor model).
//!
//! # Key types
//!
//! - [`Relay`]: accept loop over any [`Transport`](topspin_transport::Transport)
//! - [`RoomManager`]: creates/destroys rooms, tracks membership
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RelayConfig`], [`RoomConfig`]: settings
//!
//! # Routing rules
//!
//! - `Recipient::All` includes the sender.
//! - `Recipient::Authority` resolves to the current authority when the
//!   frame reaches the room.
//! - `JoinRandom` with no open room gets no reply at all.
//! - When the authority leaves, `AuthorityChanged` (lowest remaining id)
//!   is sent before `ParticipantLeft`.

mod config;
mod error;
mod handler;
mod manager;
mod relay;
mod room;

pub use config::{RelayConfig, RoomConfig};
pub use error::RelayError;
pub use manager::RoomManager;
pub use relay::{Relay, RelayHandle};
pub use room::{Outbound, ParticipantSender, RoomHandle, RoomInfo};
