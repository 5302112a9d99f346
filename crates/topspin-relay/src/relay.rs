//! The relay accept loop and the state its connection handlers share.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use topspin_protocol::{Codec, JsonCodec, ParticipantId};
use topspin_transport::{Transport, TransportError, WebSocketTransport};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::handler::handle_connection;
use crate::{RelayConfig, RelayError, RoomInfo, RoomManager};

/// Shared relay state passed to each connection handler task.
pub(crate) struct RelayState<C: Codec> {
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) codec: C,
    pub(crate) config: RelayConfig,
    next_participant: AtomicU32,
    started: Instant,
}

impl<C: Codec> RelayState<C> {
    /// Hands out participant ids: 1, 2, 3, ... never reused.
    pub(crate) fn next_participant(&self) -> ParticipantId {
        ParticipantId(self.next_participant.fetch_add(1, Ordering::Relaxed))
    }

    /// Milliseconds since the relay started.
    pub(crate) fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Accepts connections and hosts session rooms.
///
/// ```rust,no_run
/// # async fn run() -> Result<(), topspin_relay::RelayError> {
/// use topspin_relay::{Relay, RelayConfig};
///
/// let relay = Relay::bind(RelayConfig::default()).await?;
/// relay.run().await
/// # }
/// ```
pub struct Relay<T: Transport, C: Codec = JsonCodec> {
    transport: T,
    state: Arc<RelayState<C>>,
}

impl Relay<WebSocketTransport, JsonCodec> {
    /// Binds a WebSocket listener on `config.bind_addr`.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        Ok(Self::new(transport, config))
    }

    /// Returns the local address the relay is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }
}

impl<T: Transport> Relay<T, JsonCodec> {
    /// A relay on any transport, speaking JSON.
    pub fn new(transport: T, config: RelayConfig) -> Self {
        Self::with_codec(transport, JsonCodec, config)
    }
}

impl<T: Transport, C: Codec> Relay<T, C> {
    pub fn with_codec(transport: T, codec: C, config: RelayConfig) -> Self {
        let state = Arc::new(RelayState {
            rooms: Mutex::new(RoomManager::new(config.room_channel_size)),
            codec,
            config,
            next_participant: AtomicU32::new(1),
            started: Instant::now(),
        });
        Self { transport, state }
    }

    /// A handle for inspecting the relay while it runs.
    pub fn handle(&self) -> RelayHandle<C> {
        RelayHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs the accept loop, spawning a handler task per connection.
    ///
    /// Returns when the transport shuts down.
    pub async fn run(mut self) -> Result<(), RelayError> {
        tracing::info!("relay running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => {
                    tracing::info!("transport shut down, relay stopping");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Read access to a running relay's rooms.
pub struct RelayHandle<C: Codec = JsonCodec> {
    state: Arc<RelayState<C>>,
}

impl<C: Codec> Clone for RelayHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Codec> RelayHandle<C> {
    pub async fn room_count(&self) -> usize {
        self.state.rooms.lock().await.room_count()
    }

    pub async fn rooms(&self) -> Vec<RoomInfo> {
        self.state.rooms.lock().await.rooms().await
    }
}
