//! JWT validation against the identity provider's published keys

use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// How long fetched keys are trusted before refetching
const JWKS_TTL: Duration = Duration::from_secs(3600);

/// Claims the budget assistant relies on
#[derive(Debug, Deserialize)]
pub struct IdentityClaims {
    /// Opaque user identifier
    pub sub: String,
    pub exp: u64,
    pub iss: Option<String>,
}

/// Cached JWKS for validating identity provider tokens
pub struct JwksCache {
    auth_base_url: String,
    client: reqwest::Client,
    keys: RwLock<Option<CachedJwks>>,
    jwks_uri: RwLock<Option<String>>,
}

struct CachedJwks {
    keys: Vec<Jwk>,
    expires_at: Instant,
}

/// OIDC discovery document (partial)
#[derive(Deserialize)]
struct OidcDiscovery {
    jwks_uri: Option<String>,
}

impl JwksCache {
    #[must_use]
    pub fn new(auth_base_url: impl Into<String>) -> Self {
        Self {
            auth_base_url: auth_base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            keys: RwLock::new(None),
            jwks_uri: RwLock::new(None),
        }
    }

    /// Cache preloaded with keys, skipping discovery until they expire
    #[must_use]
    pub fn with_keys(keys: Vec<Jwk>) -> Self {
        Self {
            auth_base_url: String::new(),
            client: reqwest::Client::new(),
            keys: RwLock::new(Some(CachedJwks {
                keys,
                expires_at: Instant::now() + JWKS_TTL,
            })),
            jwks_uri: RwLock::new(None),
        }
    }

    /// Validate a token and return its claims
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` if no published key accepts the token
    pub async fn validate(&self, token: &str) -> Result<IdentityClaims> {
        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "malformed JWT header");
            Error::Unauthenticated
        })?;

        let jwks = self.get_jwks().await.map_err(|e| {
            tracing::warn!(error = %e, "JWKS unavailable");
            Error::Unauthenticated
        })?;

        // Try each key so rotation does not reject fresh tokens
        for jwk in &jwks {
            let Ok(key) = DecodingKey::from_jwk(jwk) else {
                tracing::debug!(kid = ?jwk.common.key_id, "skipping unusable JWK");
                continue;
            };

            // Only the header's algorithm may be listed, or jsonwebtoken
            // rejects keys from a different family
            let mut validation = Validation::new(header.alg);
            validation.validate_aud = false;
            validation.required_spec_claims.remove("aud");

            match decode::<IdentityClaims>(token, &key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => tracing::debug!(kid = ?jwk.common.key_id, error = %e, "JWK rejected token"),
            }
        }

        tracing::debug!(alg = ?header.alg, kid = ?header.kid, keys = jwks.len(), "no key accepted JWT");
        Err(Error::Unauthenticated)
    }

    /// Resolve the JWKS URI from OIDC discovery (cached)
    async fn resolve_jwks_uri(&self) -> String {
        if let Some(uri) = self.jwks_uri.read().await.as_ref() {
            return uri.clone();
        }

        let discovery_url = format!("{}/.well-known/openid-configuration", self.auth_base_url);
        let discovered = match self.client.get(&discovery_url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<OidcDiscovery>()
                .await
                .ok()
                .and_then(|doc| doc.jwks_uri),
            _ => None,
        };

        let uri = discovered.unwrap_or_else(|| {
            let fallback = format!("{}/.well-known/jwks.json", self.auth_base_url);
            tracing::debug!(fallback = %fallback, "OIDC discovery unavailable, using fallback");
            fallback
        });
        tracing::info!(jwks_uri = %uri, "resolved JWKS URI");

        *self.jwks_uri.write().await = Some(uri.clone());
        uri
    }

    async fn get_jwks(&self) -> Result<Vec<Jwk>> {
        if let Some(cached) = self.keys.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.keys.clone());
            }
        }

        let url = self.resolve_jwks_uri().await;
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(Error::Config(format!(
                "JWKS endpoint returned {}: {url}",
                response.status()
            )));
        }

        let jwk_set: JwkSet = response.json().await?;
        tracing::debug!(url = %url, key_count = jwk_set.keys.len(), "fetched JWKS");

        let keys = jwk_set.keys;
        *self.keys.write().await = Some(CachedJwks {
            keys: keys.clone(),
            expires_at: Instant::now() + JWKS_TTL,
        });

        Ok(keys)
    }
}
