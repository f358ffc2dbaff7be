//! HTTP API server for the budget assistant

pub mod health;
pub mod identity;
pub mod jwt;
pub mod plans;
pub mod rate_limit;
pub mod voice;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use secrecy::SecretString;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::db::DbPool;
use crate::planner::PlanGenerator;
use crate::store::PlanStore;
use crate::voice::{Synthesizer, Transcriber};
use crate::{Error, Result};

pub use identity::{Authenticator, LOCAL_USER, PROVIDER_PREFIX};

/// Shared state for API handlers
pub struct ApiState {
    /// Present when plans live in `SQLite`; used by the readiness probe
    pub db: Option<DbPool>,
    pub store: Arc<dyn PlanStore>,
    pub generator: Option<Arc<dyn PlanGenerator>>,
    pub synthesizer: Option<Arc<dyn Synthesizer>>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub auth: Authenticator,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    store: Arc<dyn PlanStore>,
    port: u16,
    db: Option<DbPool>,
    generator: Option<Arc<dyn PlanGenerator>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    api_token: Option<SecretString>,
    jwt_cache: Option<Arc<jwt::JwksCache>>,
    rate_limit: Option<u32>,
    static_dir: Option<PathBuf>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(store: Arc<dyn PlanStore>, port: u16) -> Self {
        Self {
            store,
            port,
            db: None,
            generator: None,
            synthesizer: None,
            transcriber: None,
            api_token: None,
            jwt_cache: None,
            rate_limit: None,
            static_dir: None,
        }
    }

    /// Database checked by `/ready`
    #[must_use]
    pub fn db(mut self, db: DbPool) -> Self {
        self.db = Some(db);
        self
    }

    #[must_use]
    pub fn generator(mut self, generator: Arc<dyn PlanGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    #[must_use]
    pub fn transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    /// Static bearer token that authenticates as the local user
    #[must_use]
    pub fn api_token(mut self, token: Option<SecretString>) -> Self {
        self.api_token = token;
        self
    }

    /// Set the JWKS cache for identity provider tokens
    #[must_use]
    pub fn jwt_cache(mut self, cache: Arc<jwt::JwksCache>) -> Self {
        self.jwt_cache = Some(cache);
        self
    }

    /// Requests per minute across the whole server
    #[must_use]
    pub const fn rate_limit(mut self, requests_per_minute: Option<u32>) -> Self {
        self.rate_limit = requests_per_minute;
        self
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            db: self.db,
            store: self.store,
            generator: self.generator,
            synthesizer: self.synthesizer,
            transcriber: self.transcriber,
            auth: Authenticator::new(self.api_token, self.jwt_cache),
            rate_limiter: self.rate_limit.map(rate_limit::create_limiter),
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .nest("/api/plans", plans::router(self.state.clone()))
            .nest("/api/voice", voice::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        let router = router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit::rate_limit_middleware,
        ));

        // CORS layer for cross-origin requests from the browser front-end
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        if !self.state.auth.is_configured() {
            tracing::error!(
                "no API token or identity provider configured - every plan request will be rejected"
            );
        }
        if self.state.generator.is_none() {
            tracing::warn!("plan generation not configured");
        }

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}

/// Error returned by API handlers
///
/// Rendered as `{"error": {"code", "message"}}` with a status chosen by
/// error kind.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Serialization(_) | Error::Toml(_) => StatusCode::BAD_REQUEST,
            Error::Config(_) | Error::RecognitionUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Generation(_) | Error::Synthesis(_) | Error::Recognition(_) | Error::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::Audio(_) | Error::Persistence(_) | Error::Sqlite(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: self.0.code(),
                message: self.0.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            ApiError(Error::Validation("x".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(ApiError(Error::Unauthenticated).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError(Error::Generation("x".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError(Error::RecognitionUnavailable("x".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
