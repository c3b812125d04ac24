//! Integration tests for the WebSocket client connection.
//!
//! These tests spin up a real WebSocket server on a loopback port and
//! connect [`WebSocketConnection`] to it, so the frames actually cross
//! the network stack.

#[cfg(feature = "websocket")]
mod websocket {
    use codegame_transport::{Connection, TransportError, WebSocketConnection};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request, Response,
    };
    use tokio_tungstenite::tungstenite::http::StatusCode;

    type ServerWs = WebSocketStream<TcpStream>;

    /// Binds a listener on a random port and returns it with its address.
    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        (listener, addr)
    }

    /// Accepts one client and returns the server-side stream together
    /// with the request path and the `Authorization` header, if any.
    async fn accept(
        listener: &TcpListener,
    ) -> (ServerWs, String, Option<String>) {
        let (stream, _) = listener.accept().await.expect("should accept");
        let mut path = String::new();
        let mut auth = None;
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, resp: Response| {
                path = req.uri().to_string();
                auth = req
                    .headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned);
                Ok(resp)
            },
        )
        .await
        .expect("server handshake");
        (ws, path, auth)
    }

    #[tokio::test]
    async fn test_websocket_send_and_receive_text() {
        let (listener, addr) = bind().await;

        let server = tokio::spawn(async move {
            let (mut ws, path, _) = accept(&listener).await;
            ws.send(Message::Text("hello from server".into()))
                .await
                .unwrap();
            let msg = ws.next().await.unwrap().unwrap();
            (path, msg.into_text().unwrap().as_str().to_owned())
        });

        let conn = WebSocketConnection::connect(
            &format!("ws://{addr}/api/games/g1/spectate"),
            None,
        )
        .await
        .expect("client should connect");
        assert!(conn.id().into_inner() > 0);

        let received = conn.recv().await.expect("recv").expect("some frame");
        assert_eq!(received, "hello from server");

        conn.send("hello from client").await.expect("send");

        let (path, text) = server.await.unwrap();
        assert_eq!(path, "/api/games/g1/spectate");
        assert_eq!(text, "hello from client");
    }

    #[tokio::test]
    async fn test_websocket_recv_skips_binary_frames() {
        let (listener, addr) = bind().await;

        let server = tokio::spawn(async move {
            let (mut ws, _, _) = accept(&listener).await;
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            ws.send(Message::Text("after binary".into())).await.unwrap();
            // Keep the socket open until the client is done.
            let _ = ws.next().await;
        });

        let conn = WebSocketConnection::connect(&format!("ws://{addr}"), None)
            .await
            .expect("client should connect");

        let received = conn.recv().await.expect("recv").expect("some frame");
        assert_eq!(received, "after binary");

        conn.close("done").await.expect("close");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_close_by_client_ends_stream() {
        let (listener, addr) = bind().await;

        let server = tokio::spawn(async move {
            let (mut ws, _, _) = accept(&listener).await;
            // Reading drives the close handshake on the server side.
            let mut saw_close = false;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Close(frame) = msg {
                    saw_close = frame
                        .map(|f| f.reason.as_str() == "Normal closure.")
                        .unwrap_or(false);
                }
            }
            saw_close
        });

        let conn = WebSocketConnection::connect(&format!("ws://{addr}"), None)
            .await
            .expect("client should connect");

        conn.close("Normal closure.").await.expect("close");
        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "stream should end after close");

        assert!(server.await.unwrap(), "server should see the close reason");
    }

    #[tokio::test]
    async fn test_websocket_close_by_server_ends_stream() {
        let (listener, addr) = bind().await;

        let server = tokio::spawn(async move {
            let (mut ws, _, _) = accept(&listener).await;
            ws.close(None).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let conn = WebSocketConnection::connect(&format!("ws://{addr}"), None)
            .await
            .expect("client should connect");

        let result = conn.recv().await.expect("recv should not error");
        assert!(result.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_websocket_bearer_is_sent_as_header() {
        let (listener, addr) = bind().await;

        let server = tokio::spawn(async move {
            let (mut ws, path, auth) = accept(&listener).await;
            let _ = ws.next().await;
            (path, auth)
        });

        let conn = WebSocketConnection::connect(
            &format!("ws://{addr}/api/games/g1/connect?player_id=p1"),
            Some("s3cret"),
        )
        .await
        .expect("client should connect");
        conn.close("bye").await.expect("close");

        let (path, auth) = server.await.unwrap();
        assert_eq!(path, "/api/games/g1/connect?player_id=p1");
        assert_eq!(auth.as_deref(), Some("Bearer s3cret"));
    }

    #[tokio::test]
    async fn test_websocket_rejected_handshake_returns_connect_failed() {
        let (listener, addr) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = tokio_tungstenite::accept_hdr_async(
                stream,
                |_: &Request, _: Response| {
                    let mut err = ErrorResponse::new(Some("nope".into()));
                    *err.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(err)
                },
            )
            .await;
        });

        let result =
            WebSocketConnection::connect(&format!("ws://{addr}"), None).await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }
}
