//! System authentication
//!
//! Systems authenticate with HTTP Basic credentials (`login:password`).

use crate::{systems::SystemRecord, ApiError, ApiState};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

/// Basic credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub login: String,
    pub password: String,
}

/// Parse `Authorization: Basic <base64(login:password)>`
pub fn parse_basic(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (login, password) = decoded.split_once(':')?;
    if login.is_empty() {
        return None;
    }

    Some(BasicCredentials {
        login: login.to_string(),
        password: password.to_string(),
    })
}

/// Authenticated system
#[derive(Debug, Clone)]
pub struct AuthenticatedSystem(pub SystemRecord);

#[async_trait]
impl FromRequestParts<Arc<ApiState>> for AuthenticatedSystem {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState>,
    ) -> Result<Self, Self::Rejection> {
        let credentials = parse_basic(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("missing or malformed credentials".into()))?;

        let system = state
            .systems
            .authenticate(&credentials.login, &credentials.password)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match system {
            Some(system) => Ok(Self(system)),
            None => {
                tracing::debug!(login = %credentials.login, "Rejected system credentials");
                Err(ApiError::Unauthorized("invalid credentials".into()))
            }
        }
    }
}
