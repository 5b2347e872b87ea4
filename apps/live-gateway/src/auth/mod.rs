//! Connection identities and the token verification seam.

pub mod jwt;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub use jwt::JwtAuthenticator;

/// Role carried in an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }

    /// Only teachers may author broadcast frames and create rooms.
    pub fn can_broadcast(self) -> bool {
        matches!(self, Role::Teacher)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            _ => Err(AuthError::Invalid),
        }
    }
}

/// The `(user_id, role)` pair bound to a connection after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn teacher(user_id: i64) -> Self {
        Self::new(user_id, Role::Teacher)
    }

    pub fn student(user_id: i64) -> Self {
        Self::new(user_id, Role::Student)
    }
}

/// Verifies a bearer token presented during the handshake.
///
/// Implementations must not leak why a token was rejected beyond the
/// expired / invalid split.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::Admin, Role::Teacher, Role::Student] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("janitor".parse::<Role>(), Err(AuthError::Invalid));
    }

    #[test]
    fn only_teachers_broadcast() {
        assert!(Role::Teacher.can_broadcast());
        assert!(!Role::Student.can_broadcast());
        assert!(!Role::Admin.can_broadcast());
    }
}
