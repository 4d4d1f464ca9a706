//! Bearer-token identity.
//!
//! Every call route requires a bearer token carrying the client's identity.
//! Tokens are HS256 JWTs with `sub` (client id) and `name` claims; the
//! verification key is injected at construction. Issuance happens elsewhere.

use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Token claims.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Client id.
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Expiry (seconds since epoch).
    pub exp: u64,
}

/// Verifies bearer tokens and extracts the identity they carry.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding: Arc<DecodingKey>,
}

impl TokenVerifier {
    /// Build a verifier from the shared secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, expired, or signed with
    /// a different key.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

/// Mint a token for a client. Used by operators and tests; the server only
/// verifies.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn issue_token(
    secret: &str,
    client_id: &str,
    name: &str,
    ttl_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: client_id.to_string(),
        name: name.to_string(),
        exp: now + ttl_secs,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// The authenticated client on a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub client_id: String,
    pub name: String,
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    TokenVerifier: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = TokenVerifier::from_ref(state);

        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

        let claims = verifier.verify(token).map_err(|_| unauthorized())?;

        Ok(Identity {
            client_id: claims.sub,
            name: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn test_round_trip() {
        let token = issue_token(SECRET, "client1", "Alice", 60).unwrap();
        let claims = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(claims.sub, "client1");
        assert_eq!(claims.name, "Alice");
    }

    #[test]
    fn test_wrong_key_rejected() {
        let token = issue_token(SECRET, "client1", "Alice", 60).unwrap();
        assert!(TokenVerifier::new("other-secret").verify(&token).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: "client1".into(),
            name: "Alice".into(),
            exp: now.saturating_sub(3600),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(TokenVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(TokenVerifier::new(SECRET).verify("not-a-jwt").is_err());
    }
}
