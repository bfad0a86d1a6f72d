//! API Models

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

// ============ Activations ============

/// Activated product of a system
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Activation {
    pub id: i64,
    pub system_id: i64,
    pub regcode: Option<String>,
    /// `PAYG` for marketplace-billed instances, `FULL` otherwise
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub service: ActivationService,
}

/// Repository service of an activation
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivationService {
    pub id: i64,
    pub name: String,
    /// `plugin:/<scheme>://...`
    pub url: String,
    pub obsoleted_service_name: Option<String>,
    pub product: ActivationProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivationProduct {
    pub id: i64,
    pub identifier: String,
    pub version: String,
    pub arch: String,
    pub name: String,
}
