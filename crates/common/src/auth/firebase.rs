//! Firebase ID token verification
//!
//! Tokens are RS256 JWTs signed by Google's secure token service. Signing
//! keys come from the public JWKS endpoint and are cached; an unknown key
//! id forces a refresh since Google rotates keys every few hours.

use super::{token_error, Identity, IdentityVerifier};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, jwk::JwkSet, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Public signing keys for Firebase ID tokens
pub const FIREBASE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

#[derive(Debug, Deserialize)]
struct FirebaseClaims {
    sub: String,
    aud: String,
    iss: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

struct CachedKeys {
    set: JwkSet,
    fetched_at: Instant,
}

/// Verifies Firebase ID tokens for one project
pub struct FirebaseVerifier {
    client: reqwest::Client,
    project_id: String,
    jwks_url: String,
    cache_ttl: Duration,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>, cache_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            project_id: project_id.into(),
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            cache_ttl: Duration::from_secs(cache_secs),
            keys: RwLock::new(None),
        })
    }

    /// Expected `iss` claim
    pub fn issuer(&self) -> String {
        format!("{}{}", ISSUER_PREFIX, self.project_id)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation
    }

    async fn cached_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let guard = self.keys.read().await;
        let Some(cached) = guard.as_ref() else {
            return Ok(None);
        };
        if cached.fetched_at.elapsed() >= self.cache_ttl {
            return Ok(None);
        }

        cached
            .set
            .find(kid)
            .map(|jwk| {
                DecodingKey::from_jwk(jwk).map_err(|e| AppError::Internal {
                    message: format!("Unusable signing key '{}': {}", kid, e),
                })
            })
            .transpose()
    }

    async fn refresh_keys(&self) -> Result<()> {
        let set: JwkSet = self
            .client
            .get(&self.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(keys = set.keys.len(), "Refreshed Firebase signing keys");
        *self.keys.write().await = Some(CachedKeys {
            set,
            fetched_at: Instant::now(),
        });
        Ok(())
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        if let Some(key) = self.cached_key(kid).await? {
            return Ok(key);
        }

        self.refresh_keys().await?;
        self.cached_key(kid)
            .await?
            .ok_or_else(|| AppError::unauthorized(format!("Unknown signing key '{}'", kid)))
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        let header = decode_header(token)
            .map_err(|e| AppError::unauthorized(format!("Malformed ID token: {}", e)))?;

        if header.alg != Algorithm::RS256 {
            return Err(AppError::unauthorized(format!(
                "Unexpected token algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| AppError::unauthorized("ID token has no key id"))?;

        let key = self.decoding_key(&kid).await?;
        let claims = decode::<FirebaseClaims>(token, &key, &self.validation())
            .map(|data| data.claims)
            .map_err(token_error)?;

        if claims.sub.is_empty() {
            return Err(AppError::unauthorized("ID token has no subject"));
        }

        let identity = Identity {
            uid: claims.sub,
            email: claims.email.unwrap_or_default(),
            name: claims.name.unwrap_or_default(),
            picture: claims.picture.unwrap_or_default(),
        };

        info!(
            uid = %identity.uid,
            email = %identity.email,
            aud = %claims.aud,
            iss = %claims.iss,
            "ID token verified"
        );
        Ok(identity)
    }
}
