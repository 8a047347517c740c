//! Token authentication
//!
//! Callers authenticate with an HS256 JWT signed with the configured
//! `jwt_secret`. The token carries the username and an expiry; nothing else
//! is trusted from it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("authentication token is missing")]
    TokenMissing,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("token payload is invalid")]
    PayloadInvalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(default)]
    username: Option<String>,
    exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Issues a token for `user` that expires after `ttl`.
pub fn encode_jwt(settings: &Settings, user: &User, ttl: Duration) -> Result<String, AuthError> {
    let claims = Claims {
        username: Some(user.username.clone()),
        exp: now_secs().saturating_add(ttl.as_secs()),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| AuthError::TokenInvalid(e.to_string()))
}

/// Validates `token` and returns the user it was issued to.
pub fn decode_jwt(settings: &Settings, token: &str) -> Result<User, AuthError> {
    if token.trim().is_empty() {
        return Err(AuthError::TokenMissing);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let data = jsonwebtoken::decode::<Claims>(
        token.trim(),
        &DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid(e.to_string()),
    })?;

    data.claims
        .username
        .filter(|u| !u.trim().is_empty())
        .map(User::new)
        .ok_or(AuthError::PayloadInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(secret: &str) -> Settings {
        Settings::from_sources(None, |key| {
            (key == "FWPOLICY_JWT_SECRET").then(|| secret.to_string())
        })
        .unwrap()
    }

    #[test]
    fn test_token_roundtrip() {
        let settings = settings("s3cret");
        let token = encode_jwt(&settings, &User::new("alice"), Duration::from_secs(60)).unwrap();
        assert_eq!(decode_jwt(&settings, &token).unwrap(), User::new("alice"));
    }

    #[test]
    fn test_empty_token_is_missing() {
        assert_eq!(
            decode_jwt(&settings("s3cret"), "  ").unwrap_err(),
            AuthError::TokenMissing
        );
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token =
            encode_jwt(&settings("one"), &User::new("alice"), Duration::from_secs(60)).unwrap();
        assert!(matches!(
            decode_jwt(&settings("two"), &token).unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[test]
    fn test_garbage_is_invalid() {
        assert!(matches!(
            decode_jwt(&settings("s3cret"), "not.a.token").unwrap_err(),
            AuthError::TokenInvalid(_)
        ));
    }

    #[test]
    fn test_expired_token() {
        let settings = settings("s3cret");
        let claims = Claims {
            username: Some("alice".into()),
            exp: now_secs() - 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert_eq!(
            decode_jwt(&settings, &token).unwrap_err(),
            AuthError::TokenExpired
        );
    }

    #[test]
    fn test_missing_username_is_payload_invalid() {
        let settings = settings("s3cret");
        let claims = Claims {
            username: None,
            exp: now_secs() + 3600,
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert_eq!(
            decode_jwt(&settings, &token).unwrap_err(),
            AuthError::PayloadInvalid
        );
    }
}
