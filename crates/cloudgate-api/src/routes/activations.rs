//! System activation endpoints

use crate::middleware::{auth::AuthenticatedSystem, source::SourceAddress};
use crate::{models::*, ApiError, ApiState};
use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use cloudgate_core::{ActivationRequest, GateDecision};
use std::sync::Arc;

/// Base64 cloud instance metadata document
pub const INSTANCE_DATA_HEADER: &str = "x-instance-data";
/// Optional cloud provider name (`aws`, `azure`, `gcp`)
pub const INSTANCE_PROVIDER_HEADER: &str = "x-instance-provider";

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/systems/activations", get(list_activations))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// List the activations of the authenticated system
#[utoipa::path(
    get,
    path = "/connect/systems/activations",
    params(
        ("X-Instance-Data" = Option<String>, Header,
            description = "Cloud instance metadata document"),
        ("X-Instance-Provider" = Option<String>, Header, description = "Cloud provider hint")
    ),
    responses(
        (status = 200, description = "Activated products", body = Vec<Activation>),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Instance verification failed", body = ErrorResponse)
    ),
    tag = "connect",
    security(("basic" = []))
)]
pub async fn list_activations(
    State(state): State<Arc<ApiState>>,
    AuthenticatedSystem(system): AuthenticatedSystem,
    SourceAddress(source): SourceAddress,
    headers: HeaderMap,
) -> Result<Json<Vec<Activation>>, ApiError> {
    let document = header_value(&headers, INSTANCE_DATA_HEADER);
    let provider_hint = header_value(&headers, INSTANCE_PROVIDER_HEADER);

    let mut activations = Vec::with_capacity(system.products.len());
    for product in &system.products {
        let request = ActivationRequest {
            source_address: source,
            account_login: system.login.clone(),
            product_id: product.id,
            instance_metadata_document: document.clone(),
            cloud_provider_hint: provider_hint.clone(),
        };

        match state.gate.evaluate(&request).await {
            GateDecision::Allowed(admission) => {
                activations.push(state.listing.activation(&system, product, &admission));
            }
            GateDecision::Denied(denial) => return Err(ApiError::VerificationFailed(denial)),
        }
    }

    Ok(Json(activations))
}
