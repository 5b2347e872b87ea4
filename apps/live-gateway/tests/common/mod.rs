#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use tokio::time;
use tokio_tungstenite::tungstenite;

use live_gateway::auth::{Identity, JwtAuthenticator, Role};
use live_gateway::config::{Config, ConnectionSettings};
use live_gateway::gateway::hub::Hub;
use live_gateway::grants::{JoinClaims, LiveKitGrantIssuer};
use live_gateway::roster::MemoryRoster;
use live_gateway::AppState;

pub const WS_SECRET: &str = "test-ws-secret";
pub const LIVEKIT_KEY: &str = "test-livekit-key";
pub const LIVEKIT_SECRET: &str = "test-livekit-secret";

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Deadlines short enough for tests but long enough not to flake.
pub fn test_settings() -> ConnectionSettings {
    ConnectionSettings {
        handshake_timeout: Duration::from_secs(2),
        pong_wait: Duration::from_secs(10),
        ping_period: Duration::from_secs(9),
        write_wait: Duration::from_secs(2),
        outbound_capacity: 16,
        max_message_size: 512,
    }
}

pub fn test_config(connection: ConnectionSettings) -> Config {
    Config {
        port: 0,
        ws_jwt_secret: WS_SECRET.to_string(),
        roster_url: "http://roster.invalid".to_string(),
        roster_token: None,
        livekit_api_key: LIVEKIT_KEY.to_string(),
        livekit_api_secret: LIVEKIT_SECRET.to_string(),
        allowed_origin: None,
        connection,
    }
}

/// Build state around a running hub and an in-memory roster.
pub fn test_state(roster: MemoryRoster, connection: ConnectionSettings) -> AppState {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    AppState {
        config: Arc::new(test_config(connection)),
        hub: handle,
        authenticator: Arc::new(JwtAuthenticator::new(WS_SECRET)),
        roster: Arc::new(roster),
        grants: Arc::new(LiveKitGrantIssuer::new(LIVEKIT_KEY, LIVEKIT_SECRET)),
    }
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background.
pub async fn start_ws_server(
    roster: MemoryRoster,
    connection: ConnectionSettings,
) -> (SocketAddr, AppState) {
    let state = test_state(roster, connection);
    let app = live_gateway::routes::router().with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

#[derive(Serialize)]
struct TestWsClaims<'a> {
    user_id: i64,
    role: &'a str,
    exp: i64,
}

/// Mint an access token that expires `ttl_secs` from now (negative for an
/// already-expired token).
pub fn mint_token_with_ttl(user_id: i64, role: Role, ttl_secs: i64) -> String {
    let claims = TestWsClaims {
        user_id,
        role: role.as_str(),
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(WS_SECRET.as_bytes()),
    )
    .expect("mint test token")
}

pub fn mint_token(user_id: i64, role: Role) -> String {
    mint_token_with_ttl(user_id, role, 300)
}

pub fn decode_grant(token: &str) -> JoinClaims {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    jsonwebtoken::decode::<JoinClaims>(
        token,
        &DecodingKey::from_secret(LIVEKIT_SECRET.as_bytes()),
        &validation,
    )
    .expect("decode join token")
    .claims
}

pub async fn connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_text(ws: &mut WsClient, text: impl Into<String>) {
    let text: String = text.into();
    ws.send(tungstenite::Message::Text(text.into()))
        .await
        .expect("send text");
}

pub fn auth_request(token: &str) -> String {
    serde_json::json!({ "type": 1, "token": token }).to_string()
}

/// Connect, authenticate, and wait until the hub has registered the
/// connection.
pub async fn connect_as(addr: SocketAddr, state: &AppState, identity: Identity) -> WsClient {
    let mut ws = connect(addr).await;
    let token = mint_token(identity.user_id, identity.role);
    send_text(&mut ws, auth_request(&token)).await;
    wait_for_member(state, identity).await;
    ws
}

/// Poll the hub until `identity` has at least one registered connection.
pub async fn wait_for_member(state: &AppState, identity: Identity) {
    time::timeout(Duration::from_secs(5), async {
        loop {
            let members = state.hub.members().await.expect("hub running");
            if members.iter().any(|m| m.identity == identity) {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection never registered");
}

/// Poll the hub until it holds exactly `count` connections.
pub async fn wait_for_member_count(state: &AppState, count: usize) {
    time::timeout(Duration::from_secs(5), async {
        loop {
            let members = state.hub.members().await.expect("hub running");
            if members.len() == count {
                return;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("member count never reached");
}

/// Next data-carrying message, skipping keepalive control frames.
pub async fn next_message(ws: &mut WsClient) -> tungstenite::Message {
    time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = ws
                .next()
                .await
                .expect("stream ended")
                .expect("ws read error");
            match msg {
                tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
                other => return other,
            }
        }
    })
    .await
    .expect("timeout waiting for message")
}

pub async fn next_text(ws: &mut WsClient) -> String {
    match next_message(ws).await {
        tungstenite::Message::Text(text) => text.to_string(),
        other => panic!("expected text frame, got: {other:?}"),
    }
}

pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    serde_json::from_str(&next_text(ws).await).expect("parse frame")
}

/// Expect a close frame and return its code.
pub async fn expect_close(ws: &mut WsClient) -> u16 {
    match next_message(ws).await {
        tungstenite::Message::Close(Some(frame)) => frame.code.into(),
        other => panic!("expected Close frame, got: {other:?}"),
    }
}

/// Assert no data frame arrives within `wait`.
pub async fn assert_silent(ws: &mut WsClient, wait: Duration) {
    let result = time::timeout(wait, async {
        loop {
            match ws.next().await {
                Some(Ok(tungstenite::Message::Ping(_))) | Some(Ok(tungstenite::Message::Pong(_))) => {
                    continue
                }
                other => return other,
            }
        }
    })
    .await;
    if let Ok(msg) = result {
        panic!("expected no frame, got: {msg:?}");
    }
}
