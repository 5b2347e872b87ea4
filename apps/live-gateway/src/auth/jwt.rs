//! HS256 WebSocket access token verification.

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use super::{Authenticator, Identity};
use crate::error::AuthError;

/// Claims carried by a WebSocket access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct WsClaims {
    pub user_id: i64,
    pub role: String,
    pub exp: i64,
}

/// Verifies tokens signed with the shared WebSocket secret.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = jsonwebtoken::decode::<WsClaims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => {
                    tracing::debug!(?e, "ws token validation failed");
                    AuthError::Invalid
                }
            })?;

        let role = data.claims.role.parse()?;
        Ok(Identity::new(data.claims.user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};

    use super::*;
    use crate::auth::Role;

    const SECRET: &str = "unit-test-secret";

    fn mint(secret: &str, user_id: i64, role: &str, ttl_secs: i64) -> String {
        let claims = WsClaims {
            user_id,
            role: role.to_string(),
            exp: chrono::Utc::now().timestamp() + ttl_secs,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let auth = JwtAuthenticator::new(SECRET);
        let identity = auth.verify(&mint(SECRET, 42, "teacher", 300)).await.unwrap();
        assert_eq!(identity, Identity::new(42, Role::Teacher));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let auth = JwtAuthenticator::new(SECRET);
        let err = auth.verify(&mint(SECRET, 42, "student", -300)).await.unwrap_err();
        assert_eq!(err, AuthError::Expired);
    }

    #[tokio::test]
    async fn wrong_secret_is_invalid() {
        let auth = JwtAuthenticator::new(SECRET);
        let err = auth.verify(&mint("other", 42, "student", 300)).await.unwrap_err();
        assert_eq!(err, AuthError::Invalid);
    }

    #[tokio::test]
    async fn garbage_and_unknown_roles_are_invalid() {
        let auth = JwtAuthenticator::new(SECRET);
        assert_eq!(auth.verify("not.a.jwt").await, Err(AuthError::Invalid));
        assert_eq!(
            auth.verify(&mint(SECRET, 1, "principal", 300)).await,
            Err(AuthError::Invalid)
        );
    }
}
