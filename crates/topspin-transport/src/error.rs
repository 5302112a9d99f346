/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listener could not bind its address.
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a TCP connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// An accepted socket never completed the WebSocket upgrade.
    #[cfg(feature = "websocket")]
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// Dialing the relay failed.
    #[cfg(feature = "websocket")]
    #[error("dial {url} failed: {source}")]
    Dial {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// Reading, writing or closing an established WebSocket failed.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    /// The in-process relay this connector points at is gone.
    #[error("relay unreachable")]
    Unreachable,

    /// One end of the connection is already closed.
    #[error("connection closed: {0}")]
    Closed(&'static str),

    /// The transport stopped accepting connections.
    #[error("transport shut down")]
    Shutdown,
}

#[cfg(feature = "websocket")]
impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(e))
    }
}
