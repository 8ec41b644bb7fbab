//! API route handlers
//!
//! This module contains all HTTP endpoint implementations for the buscador
//! server. Routes are organized by functionality:
//!
//! - `health`: Health checks and readiness
//! - `search`: Cross-modal retrieval queries (text and image)

pub mod health;
pub mod search;

use crate::error::{ServerError, ServerResult};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// API version and base info
///
/// Returns server information including version and available endpoints.
/// This is the root endpoint (GET /).
pub async fn api_info() -> ServerResult<impl IntoResponse> {
    Ok(Json(json!({
        "name": "Buscador Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/buscar_por_texto",
            "/buscar_por_imagen",
            "/imagenes/{name}",
            "/health",
            "/ready"
        ]
    })))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
