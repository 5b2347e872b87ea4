//! Video-room join credentials.
//!
//! Tokens follow the LiveKit access token layout so a LiveKit server
//! configured with the same key pair accepts them.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::auth::{Identity, Role};
use crate::error::GrantError;

/// How long a join credential stays valid.
pub const GRANT_TTL: Duration = Duration::from_secs(60 * 60);

/// Mints a per-recipient join credential for a room.
#[async_trait]
pub trait GrantIssuer: Send + Sync {
    async fn issue(&self, room_id: &str, recipient: &Identity) -> Result<String, GrantError>;
}

/// Display identity a recipient joins the room under.
pub fn participant_name(identity: &Identity) -> String {
    match identity.role {
        Role::Teacher => format!("teacher-{}", identity.user_id),
        Role::Student => format!("student-{}", identity.user_id),
        Role::Admin => format!("user-{}", identity.user_id),
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room_join: bool,
    pub room: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinClaims {
    pub iss: String,
    pub sub: String,
    pub name: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

/// Issues HS256 join tokens signed with the LiveKit API secret.
pub struct LiveKitGrantIssuer {
    api_key: String,
    key: EncodingKey,
}

impl LiveKitGrantIssuer {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            key: EncodingKey::from_secret(api_secret.as_bytes()),
        }
    }
}

#[async_trait]
impl GrantIssuer for LiveKitGrantIssuer {
    async fn issue(&self, room_id: &str, recipient: &Identity) -> Result<String, GrantError> {
        let now = chrono::Utc::now().timestamp();
        let participant = participant_name(recipient);
        let claims = JoinClaims {
            iss: self.api_key.clone(),
            sub: participant.clone(),
            name: participant,
            nbf: now,
            exp: now + GRANT_TTL.as_secs() as i64,
            video: VideoGrant {
                room_join: true,
                room: room_id.to_string(),
            },
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.key)?;
        Ok(token)
    }
}
