//! Bearer authentication resolving requests to an [`Identity`]
//!
//! Two credentials are accepted: the configured static API token, which
//! acts as the single local user, and identity provider JWTs whose `sub`
//! claim becomes the user identifier under [`PROVIDER_PREFIX`]. The prefix
//! keeps the two credential kinds from ever sharing a plan collection.
//! With neither configured every authenticated route answers 401.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use secrecy::{ExposeSecret, SecretString};

use super::jwt::JwksCache;
use super::{ApiError, ApiState};
use crate::store::Identity;
use crate::{Error, Result};

/// User identifier for holders of the static API token
pub const LOCAL_USER: &str = "local";

/// Namespace for user identifiers issued by the identity provider
pub const PROVIDER_PREFIX: &str = "idp:";

/// Verifies bearer credentials
pub struct Authenticator {
    api_token: Option<SecretString>,
    jwks: Option<Arc<JwksCache>>,
}

impl Authenticator {
    #[must_use]
    pub const fn new(api_token: Option<SecretString>, jwks: Option<Arc<JwksCache>>) -> Self {
        Self { api_token, jwks }
    }

    /// Whether any credential could ever be accepted
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_token.is_some() || self.jwks.is_some()
    }

    /// Resolve a bearer token to an identity
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` if the token matches no credential
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        if let Some(expected) = &self.api_token {
            if constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()) {
                return Identity::new(LOCAL_USER);
            }
        }

        if let Some(jwks) = &self.jwks {
            let claims = jwks.validate(token).await?;
            if claims.sub.trim().is_empty() {
                return Err(Error::Unauthenticated);
            }
            return Identity::new(format!("{PROVIDER_PREFIX}{}", claims.sub));
        }

        Err(Error::Unauthenticated)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extract the bearer token from the Authorization header
fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware attaching the caller's [`Identity`] to the request
///
/// # Errors
///
/// Responds 401 when the caller cannot be authenticated
pub async fn require_identity(
    State(state): State<Arc<ApiState>>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, ApiError> {
    let Some(token) = bearer_token(&req) else {
        tracing::debug!("no bearer token provided");
        return Err(Error::Unauthenticated.into());
    };

    let identity = state.auth.authenticate(token).await?;
    tracing::debug!(user_id = identity.user_id(), "request authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
