//! Per-connection session state.

use std::fmt;

use crate::auth::Identity;

/// Lifecycle of one gateway connection.
///
/// `Connecting → Authenticated → Active → Closing → Closed`. A failed
/// handshake goes straight from `Connecting` to `Closing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticated)
                | (Connecting, Closing)
                | (Authenticated, Active)
                | (Authenticated, Closing)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Active => "active",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks the lifecycle of one connection and logs each transition.
#[derive(Debug)]
pub struct Lifecycle {
    connection_id: String,
    state: ConnectionState,
}

impl Lifecycle {
    pub fn new(connection_id: String) -> Self {
        Self {
            connection_id,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`. Invalid transitions are logged and ignored.
    pub fn advance(&mut self, next: ConnectionState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                connection_id = %self.connection_id,
                from = %self.state,
                to = %next,
                "ignoring invalid connection state transition"
            );
            return;
        }
        tracing::debug!(
            connection_id = %self.connection_id,
            from = %self.state,
            to = %next,
            "connection state changed"
        );
        self.state = next;
    }
}

/// Identity bound to an authenticated connection. Immutable once created.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    /// Authenticated user and role.
    pub identity: Identity,
}

impl GatewaySession {
    pub fn new(connection_id: String, identity: Identity) -> Self {
        Self {
            connection_id,
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut lifecycle = Lifecycle::new("conn_test".to_string());
        for next in [
            ConnectionState::Authenticated,
            ConnectionState::Active,
            ConnectionState::Closing,
            ConnectionState::Closed,
        ] {
            lifecycle.advance(next);
            assert_eq!(lifecycle.state(), next);
        }
    }

    #[test]
    fn failed_handshake_skips_to_closing() {
        let mut lifecycle = Lifecycle::new("conn_test".to_string());
        lifecycle.advance(ConnectionState::Closing);
        lifecycle.advance(ConnectionState::Closed);
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn closed_connections_are_never_resurrected() {
        let mut lifecycle = Lifecycle::new("conn_test".to_string());
        lifecycle.advance(ConnectionState::Closing);
        lifecycle.advance(ConnectionState::Closed);
        lifecycle.advance(ConnectionState::Active);
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
        assert!(!ConnectionState::Connecting.can_transition_to(ConnectionState::Active));
    }
}
