//! Cloudgate Activation API
//!
//! Serves the activations of registered systems, guarded by cloud instance
//! verification.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ACTIVATION API                                 │
//! │                                                                         │
//! │  GET /connect/systems/activations                                       │
//! │     │                                                                   │
//! │     ├── Basic auth ──────────────▶ SystemDirectory                      │
//! │     ├── X-Forwarded-For / peer ──▶ source address                       │
//! │     ├── X-Instance-Data ─────────▶ VerificationGate (per product)       │
//! │     │                                 │                                 │
//! │     │                      Allowed ───┴─── Denied                       │
//! │     │                         │               │                         │
//! │     ▼                         ▼               ▼                         │
//! │  200 [activation]  ◀── RepositoryListing     403 "Instance verification │
//! │                                                   failed"               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod listing;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod systems;

use axum::{body::Body, http::Request, routing::get, Json, Router};
use cloudgate_core::VerificationGate;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub use config::ServiceConfig;
pub use error::ApiError;
pub use listing::{PluginServiceListing, RepositoryListing};
pub use models::*;
pub use systems::{InMemorySystemDirectory, SystemDirectory, SystemRecord};

/// API state
#[derive(Clone)]
pub struct ApiState {
    /// Instance verification gate
    pub gate: Arc<VerificationGate>,
    /// Credential and product lookup
    pub systems: Arc<dyn SystemDirectory>,
    /// Builds the service entries of allowed activations
    pub listing: Arc<dyn RepositoryListing>,
    /// Take the source address from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
}

impl ApiState {
    pub fn new(
        gate: Arc<VerificationGate>,
        systems: Arc<dyn SystemDirectory>,
        listing: Arc<dyn RepositoryListing>,
    ) -> Self {
        Self {
            gate,
            systems,
            listing,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trusted_proxy(mut self, trusted: bool) -> Self {
        self.trust_forwarded_for = trusted;
        self
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cloudgate API",
        version = "1.0.0",
        description = "Repository activations for cloud-billed systems",
        license(name = "Apache-2.0")
    ),
    paths(
        routes::health::health_check,
        routes::activations::list_activations,
    ),
    components(
        schemas(
            ErrorResponse, HealthResponse,
            Activation, ActivationService, ActivationProduct
        )
    ),
    modifiers(&BasicAuthScheme),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "connect", description = "System activation endpoints")
    )
)]
pub struct ApiDoc;

/// Registers the `basic` scheme referenced by system endpoints
struct BasicAuthScheme;

impl Modify for BasicAuthScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi
            .components
            .get_or_insert_with(Default::default)
            .add_security_scheme("basic", SecurityScheme::Http(Http::new(HttpAuthScheme::Basic)));
    }
}

/// Build the API router
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/connect", routes::activations::router())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http().make_span_with(
                |request: &Request<Body>| {
                    tracing::info_span!(
                        "http",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %uuid::Uuid::new_v4(),
                    )
                },
            )),
        )
        .with_state(Arc::new(state))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
