//! Integration tests for the WebSocket transport.
//!
//! These bind a real listener on an OS-assigned port and dial it with the
//! crate's own connector, so both halves of the link are exercised.

#[cfg(feature = "websocket")]
mod websocket {
    use topspin_transport::{
        Connection, Connector, Transport, TransportError, WebSocketConnector,
        WebSocketTransport,
    };

    async fn bind_local() -> (WebSocketTransport, WebSocketConnector) {
        let transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().expect("should have local addr");
        (transport, WebSocketConnector::new(format!("ws://{addr}")))
    }

    #[tokio::test]
    async fn test_websocket_connector_send_and_receive() {
        let (mut transport, connector) = bind_local().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = connector.connect().await.expect("client should dial");
        let server = server_handle.await.expect("task should complete");

        assert_ne!(client.id(), server.id());

        server.send(b"hello from relay").await.expect("send");
        let got = client.recv().await.expect("recv").expect("data");
        assert_eq!(got, b"hello from relay");

        client.send_unreliable(b"hello from client").await.expect("send");
        let got = server.recv().await.expect("recv").expect("data");
        assert_eq!(got, b"hello from client");

        server.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (mut transport, connector) = bind_local().await;

        let server_handle = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let client = connector.connect().await.expect("client should dial");
        let server = server_handle.await.unwrap();

        client.close().await.expect("close");

        let result = server.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_websocket_connector_unreachable_fails() {
        // Bind then drop to get a port nobody listens on.
        let (transport, connector) = bind_local().await;
        drop(transport);

        let err = connector.connect().await.err().expect("dial should fail");
        assert!(matches!(err, TransportError::Dial { .. }));
        assert!(err.to_string().starts_with("dial ws://127.0.0.1:"));
    }

    #[tokio::test]
    async fn test_websocket_bind_taken_port_reports_address() {
        let (taken, _) = bind_local().await;
        let addr = taken.local_addr().expect("local addr").to_string();

        let err = WebSocketTransport::bind(&addr).await.err().expect("port is taken");
        match err {
            TransportError::Bind { addr: reported, .. } => assert_eq!(reported, addr),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_plain_tcp_client_fails_handshake() {
        let (mut transport, _) = bind_local().await;
        let addr = transport.local_addr().expect("local addr");

        let server_handle = tokio::spawn(async move { transport.accept().await });
        let socket = tokio::net::TcpStream::connect(addr).await.expect("tcp connect");
        drop(socket);

        let result = server_handle.await.expect("task should complete");
        assert!(matches!(result, Err(TransportError::Handshake(_))));
    }
}
