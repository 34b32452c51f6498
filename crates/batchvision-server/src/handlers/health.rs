use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::debug;

use batchvision_core::api_types::HealthResponse;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");

    let response = HealthResponse {
        status: "ok".to_string(),
        version: VERSION.to_string(),
        processing: state.batch.is_processing(),
        item_count: state.batch.item_count(),
    };

    (StatusCode::OK, Json(response))
}
