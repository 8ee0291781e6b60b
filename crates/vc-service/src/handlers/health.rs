//! Liveness banner and health check handlers.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Banner returned by `GET /`.
pub const ROOT_BANNER: &str = "Voice Chat service is running!";

/// Handler for GET /
pub async fn root() -> &'static str {
    ROOT_BANNER
}

/// Handler for GET /health
///
/// Pings the record store and reports the realtime mode in effect. Always
/// answers 200 so orchestrators can read the body.
///
/// ```json
/// { "status": "healthy", "mode": "real", "store": "healthy" }
/// ```
#[instrument(skip_all, name = "vc.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_healthy = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(target: "vc.handlers.health", error = %e, "Record store ping failed");
            false
        }
    };

    let status = if store_healthy { "healthy" } else { "unhealthy" };

    Json(HealthResponse {
        status: status.to_string(),
        mode: state.mode.current().as_str().to_string(),
        store: status.to_string(),
    })
}
