//! End-to-end tests against a running server
//!
//! Each test binds the router on an ephemeral port and talks to it with a
//! real WebSocket client.

use chathub::api::{build_router, AppState};
use chathub::auth::Claims;
use chathub::config::Config;
use chathub::websocket::RoutingMode;
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "e2e-secret";
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn token(user_id: i64, username: &str, ttl_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        user_id,
        username: username.to_string(),
        exp: (now + ttl_secs).max(0) as u64,
        iat: Some(now as u64),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = SECRET.to_string();
    config
}

async fn start_server(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::from_config(&config);
    let router = build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, state)
}

async fn connect(addr: SocketAddr, token: &str) -> Result<Socket, tungstenite::Error> {
    let url = format!("ws://{}/ws?token={}", addr, token);
    connect_async(url).await.map(|(socket, _)| socket)
}

async fn wait_for_connections(state: &AppState, expected: usize) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while state.hub.connection_count().await != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {} connections",
            expected
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn next_text(socket: &mut Socket) -> String {
    loop {
        let message = tokio::time::timeout(RECV_TIMEOUT, socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("receive failed");

        match message {
            Message::Text(text) => return text,
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    let result = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "expected no message, got {:?}", result);
}

#[tokio::test]
async fn test_broadcast_reaches_all_and_survives_disconnect() {
    let (addr, state) = start_server(test_config()).await;

    let mut alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &token(2, "bob", 3600)).await.unwrap();
    wait_for_connections(&state, 2).await;

    alice.send(Message::Text("hello".to_string())).await.unwrap();
    assert_eq!(next_text(&mut alice).await, "hello");
    assert_eq!(next_text(&mut bob).await, "hello");

    alice.close(None).await.unwrap();
    wait_for_connections(&state, 1).await;

    bob.send(Message::Text("still here".to_string())).await.unwrap();
    assert_eq!(next_text(&mut bob).await, "still here");
}

#[tokio::test]
async fn test_binary_frames_round_trip_as_binary() {
    let (addr, state) = start_server(test_config()).await;

    let mut alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    wait_for_connections(&state, 1).await;

    alice.send(Message::Binary(vec![0xde, 0xad])).await.unwrap();
    let frame = tokio::time::timeout(RECV_TIMEOUT, alice.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame, Message::Binary(vec![0xde, 0xad]));
}

#[tokio::test]
async fn test_invalid_tokens_are_rejected_before_upgrade() {
    let (addr, state) = start_server(test_config()).await;

    let expired = token(1, "alice", -3600);
    let mut tampered = token(1, "alice", 3600);
    tampered.push('x');

    for bad in [expired.as_str(), tampered.as_str(), "", "garbage"] {
        match connect(addr, bad).await {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 401, "token {:?}", bad);
            }
            Err(other) => panic!("unexpected error for {:?}: {}", bad, other),
            Ok(_) => panic!("handshake with {:?} should fail", bad),
        }
    }

    assert_eq!(state.hub.connection_count().await, 0);
    assert_eq!(state.hub.stats().registered, 0);
}

#[tokio::test]
async fn test_server_close_is_sent_when_hub_drops_client() {
    let (addr, state) = start_server(test_config()).await;

    let mut alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    wait_for_connections(&state, 1).await;

    let listing = state.hub.connected_clients().await;
    assert!(state.hub.unregister(&listing[0].id).await);

    let frame = tokio::time::timeout(RECV_TIMEOUT, alice.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, Message::Close(_)));
}

#[tokio::test]
async fn test_direct_routing_end_to_end() {
    let mut config = test_config();
    config.hub.routing = RoutingMode::Direct;
    let (addr, state) = start_server(config).await;

    let mut alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    let mut bob = connect(addr, &token(2, "bob", 3600)).await.unwrap();
    let mut carol = connect(addr, &token(3, "carol", 3600)).await.unwrap();
    wait_for_connections(&state, 3).await;

    let dm = r#"{"type":"dm","to":2,"content":"hi bob"}"#;
    alice.send(Message::Text(dm.to_string())).await.unwrap();

    assert_eq!(next_text(&mut bob).await, dm);
    assert_eq!(next_text(&mut alice).await, dm);
    assert_silent(&mut carol).await;
}

#[tokio::test]
async fn test_idle_client_is_disconnected() {
    let mut config = test_config();
    config.hub.idle_timeout_secs = 1;
    let (addr, state) = start_server(config).await;

    let mut alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    wait_for_connections(&state, 1).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), alice.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, Message::Close(_)));
    wait_for_connections(&state, 0).await;
}

#[tokio::test]
async fn test_connection_limit_refuses_handshake() {
    let mut config = test_config();
    config.hub.max_connections = 1;
    let (addr, state) = start_server(config).await;

    let _alice = connect(addr, &token(1, "alice", 3600)).await.unwrap();
    wait_for_connections(&state, 1).await;

    match connect(addr, &token(2, "bob", 3600)).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 503),
        other => panic!("expected 503, got {:?}", other.map(|_| ())),
    }
}
