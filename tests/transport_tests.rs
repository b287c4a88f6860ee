// Integration tests for the reconnecting WebSocket transport
//
// Each test runs a real in-process WebSocket server so the transport is
// exercised over an actual socket: ordered delivery, buffering while down,
// flush-on-reconnect, the stale-session guard, and terminal failures.

use futures::{SinkExt, StreamExt};
use lingo_stream::{
    ClientMessage, ConnectionState, ServerMessage, SessionRegistry, TerminalReason, Transport,
    TransportConfig, TransportEvent, VoiceChunk, WsTransport,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

fn test_config(endpoint: String) -> TransportConfig {
    TransportConfig {
        endpoint,
        connect_timeout: Duration::from_secs(2),
        reconnect_base: Duration::from_millis(50),
        reconnect_max: Duration::from_millis(200),
        max_reconnect_attempts: 0,
    }
}

async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    (listener, endpoint)
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no connection arrived")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn recv_chunk(socket: &mut WebSocketStream<TcpStream>) -> VoiceChunk {
    loop {
        match timeout(Duration::from_secs(5), socket.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => {
                let ClientMessage::VoiceChunk(chunk) = serde_json::from_str(&text).unwrap();
                return chunk;
            }
            Ok(Some(Ok(_))) => continue,
            other => panic!("expected a voice chunk, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_connected_transport_delivers_in_order() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(64));
    registry.set_session("session-a".to_string()).await;

    let (transport, _events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));
    transport.connect("secret").await;
    let mut socket = accept_ws(&listener).await;

    for seq in 0..5 {
        transport
            .send(VoiceChunk::audio("session-a", seq, &[9]))
            .await
            .unwrap();
    }

    for seq in 0..5 {
        let chunk = recv_chunk(&mut socket).await;
        assert_eq!(chunk.seq, seq);
        assert_eq!(chunk.session_id, "session-a");
    }

    transport.disconnect().await;
}

#[tokio::test]
async fn test_chunks_buffered_while_down_flush_on_connect() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(64));
    registry.set_session("session-a".to_string()).await;

    let (transport, _events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));

    // not started yet: send must succeed and buffer
    transport
        .send(VoiceChunk::audio("session-a", 0, &[1]))
        .await
        .unwrap();
    assert_eq!(registry.pending_len().await, 1);

    transport.connect("secret").await;
    let mut socket = accept_ws(&listener).await;

    let first = recv_chunk(&mut socket).await;
    assert_eq!(first.seq, 0, "buffered chunk flushes before live traffic");

    transport
        .send(VoiceChunk::audio("session-a", 1, &[2]))
        .await
        .unwrap();
    let second = recv_chunk(&mut socket).await;
    assert_eq!(second.seq, 1);

    assert_eq!(registry.pending_len().await, 0);
    transport.disconnect().await;
}

#[tokio::test]
async fn test_transport_reconnects_after_connection_drop() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(64));
    registry.set_session("session-a".to_string()).await;

    let (transport, _events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));
    transport.connect("secret").await;

    let mut first_conn = accept_ws(&listener).await;
    transport
        .send(VoiceChunk::audio("session-a", 0, &[1]))
        .await
        .unwrap();
    assert_eq!(recv_chunk(&mut first_conn).await.seq, 0);

    // server drops the link; wait for the client side to notice
    drop(first_conn);
    for _ in 0..200 {
        if transport.state().await != ConnectionState::Connected {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_ne!(transport.state().await, ConnectionState::Connected);

    // sent while down: buffered, then flushed on the next connection
    for seq in 1..4 {
        transport
            .send(VoiceChunk::audio("session-a", seq, &[1]))
            .await
            .unwrap();
    }

    let mut second_conn = accept_ws(&listener).await;
    for seq in 1..4 {
        assert_eq!(
            recv_chunk(&mut second_conn).await.seq,
            seq,
            "no loss or reordering across the reconnect"
        );
    }

    transport.disconnect().await;
}

#[tokio::test]
async fn test_stale_session_chunks_are_never_flushed() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(64));
    registry.set_session("session-old".to_string()).await;

    let (transport, _events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));

    // buffered for the old session while the transport is down
    transport
        .send(VoiceChunk::audio("session-old", 0, &[1]))
        .await
        .unwrap();
    transport
        .send(VoiceChunk::audio("session-old", 1, &[1]))
        .await
        .unwrap();

    // the session rolls over before the endpoint comes up
    registry.set_session("session-new".to_string()).await;
    transport
        .send(VoiceChunk::audio("session-new", 0, &[2]))
        .await
        .unwrap();

    transport.connect("secret").await;
    let mut socket = accept_ws(&listener).await;

    let chunk = recv_chunk(&mut socket).await;
    assert_eq!(
        chunk.session_id, "session-new",
        "stale chunks must be dropped at flush time"
    );
    assert_eq!(chunk.seq, 0);

    // nothing else arrives
    let nothing = timeout(Duration::from_millis(300), socket.next()).await;
    assert!(
        nothing.is_err(),
        "only the current session's chunks may flush"
    );

    transport.disconnect().await;
}

#[tokio::test]
async fn test_connect_while_active_is_a_no_op() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(8));
    registry.set_session("session-a".to_string()).await;

    let (transport, _events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));
    transport.connect("secret").await;
    let mut socket = accept_ws(&listener).await;

    // second connect must not spawn a second supervisor or redial
    transport.connect("secret").await;

    transport
        .send(VoiceChunk::audio("session-a", 0, &[1]))
        .await
        .unwrap();
    assert_eq!(recv_chunk(&mut socket).await.seq, 0);

    let second = timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(second.is_err(), "no second connection may be dialed");

    transport.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_cancels_backoff() {
    let registry = Arc::new(SessionRegistry::new(8));
    // nothing listens on this port; the transport sits in backoff
    let config = TransportConfig {
        endpoint: "ws://127.0.0.1:1/voice".to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect_base: Duration::from_secs(60),
        reconnect_max: Duration::from_secs(60),
        max_reconnect_attempts: 0,
    };
    let (transport, _events) = WsTransport::new(config, registry);
    transport.connect("secret").await;

    // give it one failed attempt so it is waiting out the delay
    sleep(Duration::from_millis(200)).await;

    let start = std::time::Instant::now();
    transport.disconnect().await;
    assert!(
        start.elapsed() < Duration::from_secs(5),
        "disconnect must not wait out the backoff"
    );
    assert_eq!(transport.state().await, ConnectionState::Disconnected);

    // calling again changes nothing
    transport.disconnect().await;
    assert_eq!(transport.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_retries_exhausted_emits_terminal_event() {
    let registry = Arc::new(SessionRegistry::new(8));
    let config = TransportConfig {
        endpoint: "ws://127.0.0.1:1/voice".to_string(),
        connect_timeout: Duration::from_secs(2),
        reconnect_base: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(20),
        max_reconnect_attempts: 3,
    };
    let (transport, mut events) = WsTransport::new(config, registry);
    transport.connect("secret").await;

    let reason = loop {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(TransportEvent::Terminated(reason))) => break reason,
            Ok(Some(_)) => continue,
            other => panic!("expected a terminal event, got {:?}", other),
        }
    };
    assert_eq!(reason, TerminalReason::RetriesExhausted { attempts: 3 });
    assert_eq!(transport.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_auth_rejection_stops_the_transport() {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::StatusCode;

    let (listener, endpoint) = bind_server().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = tokio_tungstenite::accept_hdr_async(
                stream,
                |_req: &Request, _resp: Response| -> Result<Response, ErrorResponse> {
                    let mut reject = ErrorResponse::new(Some("bad token".to_string()));
                    *reject.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(reject)
                },
            )
            .await;
        }
    });

    let registry = Arc::new(SessionRegistry::new(8));
    let (transport, mut events) = WsTransport::new(test_config(endpoint), registry);
    transport.connect("expired-token").await;

    let reason = loop {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(TransportEvent::Terminated(reason))) => break reason,
            Ok(Some(_)) => continue,
            other => panic!("expected a terminal event, got {:?}", other),
        }
    };
    assert_eq!(reason, TerminalReason::AuthRejected { status: 401 });
    assert_eq!(transport.state().await, ConnectionState::Disconnected);

    // no retry follows a terminal stop
    sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_server_replies_surface_as_events() {
    let (listener, endpoint) = bind_server().await;
    let registry = Arc::new(SessionRegistry::new(8));
    registry.set_session("session-a".to_string()).await;

    let (transport, mut events) = WsTransport::new(test_config(endpoint), Arc::clone(&registry));
    transport.connect("secret").await;

    let mut socket = accept_ws(&listener).await;
    transport
        .send(VoiceChunk::audio("session-a", 0, &[5]))
        .await
        .unwrap();
    let chunk = recv_chunk(&mut socket).await;

    let reply = ServerMessage {
        session_id: Some(chunk.session_id),
        seq: chunk.seq,
        text: "hello there".to_string(),
        detected_lang: Some("en".to_string()),
        translated_text: None,
    };
    socket
        .send(Message::Text(serde_json::to_string(&reply).unwrap()))
        .await
        .unwrap();
    // junk on the wire is discarded and must not kill the link
    socket
        .send(Message::Text("{ not json".to_string()))
        .await
        .unwrap();

    let received = loop {
        match timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Some(TransportEvent::Message(m))) => break m,
            Ok(Some(_)) => continue,
            other => panic!("expected a message event, got {:?}", other),
        }
    };
    assert_eq!(received.text, "hello there");
    assert_eq!(received.seq, 0);
    assert_eq!(received.session_id.as_deref(), Some("session-a"));

    // the link survived the junk: another chunk still goes through
    transport
        .send(VoiceChunk::audio("session-a", 1, &[6]))
        .await
        .unwrap();
    assert_eq!(recv_chunk(&mut socket).await.seq, 1);

    transport.disconnect().await;
}
