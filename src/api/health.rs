//! Health check endpoints

use super::{ApiResponse, ApiState};
use crate::balance::Availability;
use axum::{extract::State, response::Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Whether the connected node supports rebalancing
    pub rebalance_available: bool,
    /// Node version, if known
    pub node_version: Option<String>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    let availability = state.app.session.snapshot().await.availability;

    let (rebalance_available, node_version) = match availability {
        Availability::Supported { version } => (true, Some(version)),
        Availability::Unsupported { version, .. } => (false, Some(version)),
        Availability::Unknown => (false, None),
    };

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        rebalance_available,
        node_version,
    };

    Json(ApiResponse::success(response))
}
