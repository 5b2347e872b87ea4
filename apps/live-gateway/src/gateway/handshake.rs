//! Handshake gateway: authenticate a fresh connection over the socket itself.

use axum::extract::ws::Message;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::time;

use crate::auth::Identity;
use crate::error::AuthError;
use crate::AppState;

use super::connection::{write_frame, WsSink, WsStream};
use super::events::{AuthRequestFrame, ErrorFrame, MessageType};
use super::server::{send_close, CLOSE_AUTH_FAILED, CLOSE_NOT_AUTHENTICATED, CLOSE_SESSION_TIMEOUT};

/// Why a connection was turned away before registration.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("no auth request within the handshake timeout")]
    Timeout,
    #[error("read failed during handshake: {0}")]
    Read(#[from] axum::Error),
    #[error("connection closed before auth request")]
    Closed,
    #[error("binary frame during handshake")]
    Binary,
    #[error("auth request is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("expected AuthRequest, got {0:?}")]
    UnexpectedType(MessageType),
    #[error("auth request without a token")]
    MissingToken,
    #[error("authentication rejected: {0}")]
    Rejected(#[from] AuthError),
}

impl HandshakeError {
    fn close_code(&self) -> u16 {
        match self {
            HandshakeError::Timeout => CLOSE_SESSION_TIMEOUT,
            HandshakeError::Rejected(_) => CLOSE_AUTH_FAILED,
            _ => CLOSE_NOT_AUTHENTICATED,
        }
    }

    /// Close reasons stay generic so validation internals never reach the client.
    fn close_reason(&self) -> &'static str {
        match self {
            HandshakeError::Timeout => "Handshake timeout",
            HandshakeError::Rejected(_) => "Authentication failed",
            _ => "Expected AuthRequest",
        }
    }
}

/// Read the first frame, verify its token, and return the caller's identity.
///
/// On any failure the connection is sent a close frame (preceded by an
/// `ErrorResp` only when the token has expired) and the error is returned for
/// logging; the caller must not touch the socket again.
pub async fn authenticate(
    state: &AppState,
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
) -> Result<Identity, HandshakeError> {
    let settings = &state.config.connection;

    let token = match time::timeout(settings.handshake_timeout, read_auth_request(ws_rx)).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::Timeout),
    };

    let result = match token {
        Ok(token) => state
            .authenticator
            .verify(&token)
            .await
            .map_err(HandshakeError::from),
        Err(err) => Err(err),
    };

    let err = match result {
        Ok(identity) => return Ok(identity),
        Err(err) => err,
    };

    tracing::debug!(error = %err, "handshake failed");

    if matches!(err, HandshakeError::Rejected(AuthError::Expired)) {
        if let Ok(json) = serde_json::to_string(&ErrorFrame::expired_token()) {
            let _ = write_frame(ws_tx, Message::Text(json.into()), settings.write_wait).await;
        }
    }
    let _ = time::timeout(
        settings.write_wait,
        send_close(ws_tx, err.close_code(), err.close_reason()),
    )
    .await;

    Err(err)
}

async fn read_auth_request(ws_rx: &mut WsStream) -> Result<String, HandshakeError> {
    while let Some(msg) = ws_rx.next().await {
        match msg? {
            Message::Text(text) => return parse_auth_request(text.as_str()),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Binary(_) => return Err(HandshakeError::Binary),
            Message::Close(_) => return Err(HandshakeError::Closed),
        }
    }
    Err(HandshakeError::Closed)
}

/// Extract the bearer token from an `AuthRequest` frame.
pub fn parse_auth_request(text: &str) -> Result<String, HandshakeError> {
    let req: AuthRequestFrame = serde_json::from_str(text)?;
    if req.kind != MessageType::AuthRequest {
        return Err(HandshakeError::UnexpectedType(req.kind));
    }
    match req.token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(HandshakeError::MissingToken),
    }
}
