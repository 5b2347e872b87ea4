//! The two loops of a connection task: inbound frames and outbound writes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::config::ConnectionSettings;
use crate::error::{HubClosed, RosterError};
use crate::AppState;

use super::events::{normalize, Envelope, FrameKind, MessageType, Outbound, RouteHeader};
use super::relay;
use super::server::{send_close, CLOSE_NORMAL};
use super::session::GatewaySession;

pub type WsSink = SplitSink<WebSocket, Message>;
pub type WsStream = SplitStream<WebSocket>;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("write deadline exceeded")]
    Deadline,
    #[error(transparent)]
    Socket(#[from] axum::Error),
}

/// An inbound frame that ends the connection.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("undecodable frame: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Roster(#[from] RosterError),
    #[error(transparent)]
    Hub(#[from] HubClosed),
}

/// Write one frame, failing if it does not complete within `write_wait`.
pub async fn write_frame<S>(ws_tx: &mut S, msg: Message, write_wait: Duration) -> Result<(), WriteError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    time::timeout(write_wait, ws_tx.send(msg))
        .await
        .map_err(|_| WriteError::Deadline)??;
    Ok(())
}

/// Outbound loop: drain the queue and keep the peer alive with pings.
///
/// Ends when the hub closes the queue (after sending a close frame) or when
/// any write misses its deadline.
pub async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<Outbound>,
    settings: ConnectionSettings,
    connection_id: String,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ping = time::interval_at(Instant::now() + settings.ping_period, settings.ping_period);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(first) = frame else {
                    let _ = time::timeout(settings.write_wait, send_close(&mut ws_tx, CLOSE_NORMAL, "")).await;
                    break;
                };

                let batch = coalesce(first, &mut outbound);
                if let Err(e) = write_frame(&mut ws_tx, Message::Text(batch.into()), settings.write_wait).await {
                    tracing::debug!(%connection_id, error = %e, "outbound write failed");
                    break;
                }
            }

            _ = ping.tick() => {
                if let Err(e) = write_frame(&mut ws_tx, Message::Ping(Default::default()), settings.write_wait).await {
                    tracing::debug!(%connection_id, error = %e, "keepalive ping failed");
                    break;
                }
            }
        }
    }
}

/// Join `first` with every frame that was already queued, newline separated.
fn coalesce(first: Outbound, outbound: &mut mpsc::Receiver<Outbound>) -> String {
    let pending = outbound.len();
    let mut batch = String::from(&*first);
    for _ in 0..pending {
        match outbound.try_recv() {
            Ok(next) => {
                batch.push('\n');
                batch.push_str(&next);
            }
            Err(_) => break,
        }
    }
    batch
}

/// Inbound loop: read frames until the peer goes away, then ask the hub to
/// unregister this connection.
///
/// The read deadline is pushed back on every frame, pongs included.
pub async fn read_loop(session: GatewaySession, mut ws_rx: WsStream, state: AppState) {
    let pong_wait = state.config.connection.pong_wait;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let msg = match time::timeout_at(deadline, ws_rx.next()).await {
            Err(_) => {
                tracing::debug!(connection_id = %session.connection_id, "read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(?e, connection_id = %session.connection_id, "ws read error");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };
        deadline = Instant::now() + pong_wait;

        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        if let Err(e) = handle_frame(&session, &state, text.as_str()).await {
            tracing::warn!(
                connection_id = %session.connection_id,
                user_id = session.identity.user_id,
                error = %e,
                "closing connection"
            );
            break;
        }
    }

    state.hub.unregister(&session.connection_id);
}

/// Route one inbound text frame.
///
/// Frames from roles that may not broadcast are dropped without feedback.
pub async fn handle_frame(
    session: &GatewaySession,
    state: &AppState,
    text: &str,
) -> Result<(), FrameError> {
    if !session.identity.role.can_broadcast() {
        tracing::trace!(
            connection_id = %session.connection_id,
            role = %session.identity.role,
            "dropping frame from non-broadcasting role"
        );
        return Ok(());
    }

    let payload = normalize(text);
    let frame: FrameKind = serde_json::from_str(&payload)?;
    if frame.kind == MessageType::AuthRequest {
        tracing::debug!(connection_id = %session.connection_id, "ignoring repeated auth request");
        return Ok(());
    }

    let header: RouteHeader = serde_json::from_str(&payload)?;

    let students = state
        .roster
        .students_of(&session.identity, header.classroom_id)
        .await?;

    if header.kind == MessageType::NewRoom {
        relay::create_room(state, session, header.classroom_id, students).await;
        return Ok(());
    }

    tracing::trace!(
        connection_id = %session.connection_id,
        kind = ?header.kind,
        classroom_id = header.classroom_id,
        element_id = ?header.element_id,
        recipients = students.len(),
        "forwarding broadcast"
    );
    state
        .hub
        .broadcast(Envelope::new(header.kind, payload, students))
        .await?;
    Ok(())
}
