//! Session layer for Topspin clients.
//!
//! This crate answers three questions for every other component:
//!
//! 1. **Am I in a session, and with whom?** ([`SessionContext`])
//! 2. **Who holds authority?** ([`SessionContext::is_authority`])
//! 3. **How do I get into a session and stay there?** ([`SessionCoordinator`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Arena layer (above)    ← reads the context, pushes into the Outbox
//!     ↕
//! Session layer (this)   ← coordinator state machine + event bus
//!     ↕
//! Protocol layer (below) ← ParticipantId, GameMessage, Recipient
//! ```
//!
//! Nothing here does I/O. The client runtime turns relay traffic into
//! [`SessionEvent`]s and carries out the [`LinkCommand`]s the coordinator
//! emits, which keeps the whole lifecycle testable with plain values.

mod config;
mod context;
mod coordinator;
mod error;
mod events;
mod outbox;

pub use config::SessionConfig;
pub use context::{JoinedSession, RoleChange, Roster, SessionContext};
pub use coordinator::{CoordinatorState, LinkCommand, SessionCoordinator};
pub use error::SessionError;
pub use events::{EventQueue, SessionEvent};
pub use outbox::{Outbox, Outgoing};
