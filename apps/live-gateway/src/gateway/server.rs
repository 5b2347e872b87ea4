//! WebSocket upgrade handler and per-connection supervisor.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use studyhub_common::id::{prefix, prefixed_ulid};

use crate::AppState;

use super::connection;
use super::handshake;
use super::registry::Connection;
use super::session::{ConnectionState, GatewaySession, Lifecycle};

/// Close codes (4000-range for application-level).
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
pub const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_SESSION_TIMEOUT: u16 = 4009;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let max_message_size = state.config.connection.max_message_size;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let connection_id = prefixed_ulid(prefix::CONNECTION);
    let mut lifecycle = Lifecycle::new(connection_id.clone());
    let settings = state.config.connection.clone();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: authenticate over the socket before anything else.
    let identity = match handshake::authenticate(&state, &mut ws_tx, &mut ws_rx).await {
        Ok(identity) => identity,
        Err(_) => {
            lifecycle.advance(ConnectionState::Closing);
            lifecycle.advance(ConnectionState::Closed);
            return;
        }
    };
    lifecycle.advance(ConnectionState::Authenticated);

    // Step 2: register with the hub. The hub now owns the only sender.
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity);
    let connection = Connection {
        id: connection_id.clone(),
        identity,
        outbound: outbound_tx,
    };
    if state.hub.register(connection).await.is_err() {
        tracing::warn!(%connection_id, "hub unavailable, rejecting connection");
        let _ = time::timeout(
            settings.write_wait,
            send_close(&mut ws_tx, CLOSE_TRY_AGAIN_LATER, "Server shutting down"),
        )
        .await;
        lifecycle.advance(ConnectionState::Closing);
        lifecycle.advance(ConnectionState::Closed);
        return;
    }
    lifecycle.advance(ConnectionState::Active);

    tracing::info!(
        %connection_id,
        user_id = identity.user_id,
        role = %identity.role,
        "gateway connection established"
    );

    // Step 3: run both loops until one of them ends.
    let session = GatewaySession::new(connection_id.clone(), identity);
    let mut send_task = tokio::spawn(connection::write_loop(
        ws_tx,
        outbound_rx,
        settings,
        connection_id.clone(),
    ));
    let mut recv_task = tokio::spawn(connection::read_loop(session, ws_rx, state.clone()));

    let send_finished = tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            true
        }
        _ = &mut recv_task => false,
    };

    lifecycle.advance(ConnectionState::Closing);
    state.hub.unregister(&connection_id);
    if !send_finished {
        // Flushes what is queued, then sends the close frame once the hub
        // drops the queue.
        let _ = send_task.await;
    }
    lifecycle.advance(ConnectionState::Closed);

    tracing::info!(
        %connection_id,
        user_id = identity.user_id,
        "gateway connection ended"
    );
}

/// Send a WebSocket close frame with a code and reason.
pub async fn send_close<S>(ws_tx: &mut S, code: u16, reason: &str) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
