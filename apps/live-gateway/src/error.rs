//! Error types shared across the gateway and its collaborators.

use thiserror::Error;

/// Outcome of a failed token verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The token was well-formed and signed but its `exp` has passed.
    #[error("token expired")]
    Expired,
    /// Any other failure: bad signature, malformed claims, unknown role.
    #[error("invalid token")]
    Invalid,
}

/// Failure to resolve a classroom roster.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("access to classroom {0} denied")]
    AccessDenied(i64),
    #[error("classroom {0} not found")]
    NotFound(i64),
    #[error("roster service unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for RosterError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Failure to mint a join credential for one recipient.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error(transparent)]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// The hub control loop is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hub is not running")]
pub struct HubClosed;
