//! Authentication utilities
//!
//! Provides:
//! - Bearer credential extraction
//! - Identity verification behind the [`IdentityVerifier`] trait
//!   (Firebase ID tokens, or HS256 tokens signed with a shared secret)
//! - An axum extractor for the identity attached by the session middleware

mod firebase;

pub use firebase::FirebaseVerifier;

use crate::config::{AuthConfig, VerifierKind};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decoded identity of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id
    pub uid: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

/// Verifies bearer credentials issued by an identity provider
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Decode and verify a bearer token
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is matched case-insensitively.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    let mut parts = auth_header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Some(token),
        _ => None,
    }
}

/// Verify the bearer credential carried by `headers`
pub async fn authenticate(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<Identity> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let token = extract_bearer_token(auth_header).ok_or_else(|| {
        AppError::unauthorized("Missing or invalid Authorization header. Expected 'Bearer <token>'.")
    })?;

    verifier.verify(token).await
}

/// Build the verifier selected in configuration
pub fn create_verifier(config: &AuthConfig) -> Result<Arc<dyn IdentityVerifier>> {
    match config.verifier {
        VerifierKind::Firebase => {
            let project_id = config.project_id.clone().ok_or_else(|| AppError::Configuration {
                message: "auth.project_id is required for the firebase verifier".to_string(),
            })?;
            Ok(Arc::new(FirebaseVerifier::new(project_id, config.jwks_cache_secs)?))
        }
        VerifierKind::SharedSecret => {
            let secret = config.shared_secret.as_deref().ok_or_else(|| AppError::Configuration {
                message: "auth.shared_secret is required for the shared_secret verifier".to_string(),
            })?;
            Ok(Arc::new(SharedSecretVerifier::new(secret, 3600)))
        }
    }
}

/// Claims carried by shared-secret tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user id)
    pub sub: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub picture: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// HS256 token issuer and verifier for self-hosted and test deployments
pub struct SharedSecretVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl SharedSecretVerifier {
    /// Create a new verifier with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Issue a token for `identity`
    pub fn issue_token(&self, identity: &Identity) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = TokenClaims {
            sub: identity.uid.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            AppError::Internal {
                message: format!("Failed to issue token: {}", e),
            }
        })
    }
}

#[async_trait]
impl IdentityVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(token_error)?;

        if claims.sub.is_empty() {
            return Err(AppError::unauthorized("Token has no subject"));
        }

        Ok(Identity {
            uid: claims.sub,
            email: claims.email,
            name: claims.name,
            picture: claims.picture,
        })
    }
}

/// Map a token decoding failure to an authorization error
fn token_error(e: jsonwebtoken::errors::Error) -> AppError {
    match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::unauthorized("Token expired")
        }
        _ => AppError::unauthorized(format!("Invalid token: {}", e)),
    }
}

/// Axum extractor for the identity attached by the session middleware
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}
