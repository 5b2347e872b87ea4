//! Room grant relay: one personalized join credential per recipient.

use tokio::sync::mpsc::error::TrySendError;

use studyhub_common::id::{prefix, prefixed_ulid};

use crate::auth::Identity;
use crate::AppState;

use super::events::JoinTokenFrame;
use super::registry::Member;
use super::session::GatewaySession;

/// What happened to a single `NewRoom` request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelaySummary {
    pub room_id: String,
    pub delivered: usize,
    pub failed: usize,
}

/// Create a room and push a join credential to the requesting teacher and to
/// every registered connection of `students`.
///
/// Each issuance is independent: a failure for one recipient is logged and
/// does not affect the others or the requester's connection.
pub async fn create_room(
    state: &AppState,
    session: &GatewaySession,
    classroom_id: i64,
    students: Vec<Identity>,
) -> RelaySummary {
    let mut summary = RelaySummary {
        room_id: prefixed_ulid(prefix::ROOM),
        ..Default::default()
    };

    let lookup = match state.hub.lookup(&session.connection_id, students).await {
        Ok(lookup) => lookup,
        Err(e) => {
            tracing::warn!(connection_id = %session.connection_id, error = %e, "room grant lookup failed");
            return summary;
        }
    };

    for peer in lookup.requester.iter().chain(lookup.recipients.iter()) {
        if deliver_grant(state, &summary.room_id, peer).await {
            summary.delivered += 1;
        } else {
            summary.failed += 1;
        }
    }

    tracing::info!(
        connection_id = %session.connection_id,
        classroom_id,
        room_id = %summary.room_id,
        delivered = summary.delivered,
        failed = summary.failed,
        "room grants relayed"
    );
    summary
}

/// Issue one credential, then fetch the peer's queue handle and push it.
/// The handle is dropped on return, so a peer unregistered while the issuer
/// was running is never written to.
async fn deliver_grant(state: &AppState, room_id: &str, peer: &Member) -> bool {
    let token = match state.grants.issue(room_id, &peer.identity).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(
                connection_id = %peer.connection_id,
                user_id = peer.identity.user_id,
                %room_id,
                error = %e,
                "grant issuance failed"
            );
            return false;
        }
    };

    let frame = match serde_json::to_string(&JoinTokenFrame::new(&token)) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(?e, "failed to encode join token frame");
            return false;
        }
    };

    let connection = match state.hub.connection(&peer.connection_id).await {
        Ok(Some(connection)) => connection,
        Ok(None) | Err(_) => {
            tracing::debug!(connection_id = %peer.connection_id, "grant recipient left before delivery");
            return false;
        }
    };

    match connection.outbound.try_send(frame.into()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(
                connection_id = %connection.id,
                user_id = connection.identity.user_id,
                "outbound queue full, evicting slow connection"
            );
            state.hub.unregister(&connection.id);
            false
        }
        Err(TrySendError::Closed(_)) => false,
    }
}
