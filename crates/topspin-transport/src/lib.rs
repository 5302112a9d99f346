//! Transport abstraction layer for Topspin.
//!
//! Three traits cover both ends of a link:
//!
//! - [`Connection`]: one bidirectional byte pipe.
//! - [`Transport`]: the relay side, accepting incoming connections.
//! - [`Connector`]: the client side, dialing out to the relay.
//!
//! Every method returns a `Send` future so generic code can run
//! connections inside `tokio::spawn`ed tasks.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//!
//! The in-memory transport ([`memory_transport`]) is always available; it
//! backs tests and single-process matches.

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{
    MemoryConnection, MemoryConnector, MemoryTransport, memory_transport,
};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter shared by every transport so ids are unique per process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// Sends data to the remote peer, reliably and in order.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends data over an unreliable channel.
    ///
    /// Defaults to reliable send. Transports with a datagram path should
    /// override this.
    fn send_unreliable(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        self.send(data)
    }

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

/// Accepts new incoming connections (relay side).
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Gracefully shuts down the transport, stopping new connections.
    fn shutdown(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Opens outgoing connections (client side).
///
/// A connector is reusable: the session layer dials again with the same
/// connector after every connectivity failure.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Dials the remote endpoint.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}
