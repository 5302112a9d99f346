//! In-process transport built on Tokio channels.
//!
//! [`memory_transport`] returns a linked pair: the relay accepts on the
//! [`MemoryTransport`], clients dial with clones of the
//! [`MemoryConnector`]. Each connection is two unbounded channels, so
//! delivery is reliable and ordered, like a WebSocket without the socket.

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, Connector, Transport, TransportError};

/// Creates a connected transport/connector pair.
pub fn memory_transport() -> (MemoryTransport, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryTransport { incoming: rx },
        MemoryConnector { incoming: tx },
    )
}

/// Relay side of the in-memory transport.
pub struct MemoryTransport {
    incoming: mpsc::UnboundedReceiver<MemoryConnection>,
}

impl Transport for MemoryTransport {
    type Connection = MemoryConnection;

    async fn accept(&mut self) -> Result<MemoryConnection, TransportError> {
        let conn = self.incoming.recv().await.ok_or(TransportError::Shutdown)?;
        tracing::debug!(id = %conn.id(), "accepted in-memory connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Client side of the in-memory transport. Cheap to clone.
#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemoryConnection>,
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, TransportError> {
        let (client, relay) = MemoryConnection::pair();
        self.incoming
            .send(relay)
            .map_err(|_| TransportError::Unreachable)?;
        Ok(client)
    }
}

/// One end of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    /// `None` once this end has been closed.
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryConnection {
    /// Creates two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let a = Self {
            id: ConnectionId::next(),
            tx: Mutex::new(Some(a_tx)),
            rx: Mutex::new(a_rx),
        };
        let b = Self {
            id: ConnectionId::next(),
            tx: Mutex::new(Some(b_tx)),
            rx: Mutex::new(b_rx),
        };
        (a, b)
    }
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let guard = self.tx.lock().await;
        let tx = guard
            .as_ref()
            .ok_or(TransportError::Closed("local end closed"))?;
        tx.send(data.to_vec())
            .map_err(|_| TransportError::Closed("remote end dropped"))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the sender makes the peer's `recv` return `None`.
        self.tx.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
