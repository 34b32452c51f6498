use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use batchvision_core::api_types::{GenerateSchemaRequest, GenerateSchemaResponse};
use batchvision_core::BatchVisionError;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/schema/generate: draft a schema and prompt from a description.
pub async fn generate_schema(
    State(state): State<AppState>,
    Json(req): Json<GenerateSchemaRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.images_of.trim().is_empty() || req.schema_description.trim().is_empty() {
        return Err(AppError::bad_request("Missing required fields"));
    }
    let credential = state
        .credential(req.api_key.as_deref())
        .ok_or_else(|| AppError::bad_request("Missing API key"))?;

    info!(images_of = %req.images_of, "Generating schema");

    let generated = state
        .schema_generator
        .generate(&req.images_of, &req.schema_description, &credential)
        .await
        .map_err(|e| match e {
            BatchVisionError::InvalidSchema(message) => AppError::Upstream(message),
            other => AppError::from(other),
        })?;

    Ok((
        StatusCode::OK,
        Json(GenerateSchemaResponse {
            schema: generated.schema,
            prompt_text: generated.prompt_text,
        }),
    ))
}
