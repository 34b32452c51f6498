use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{info, warn};

use batchvision_batch::validate_response;
use batchvision_core::api_types::ProcessImageResponse;
use batchvision_core::{BatchVisionError, FileBlob, RawResponse, Schema};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Default)]
struct ProcessForm {
    file: Option<FileBlob>,
    prompt: Option<String>,
    schema: Option<String>,
    api_key: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<ProcessForm, AppError> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Failed to read file: {e}")))?;
                let mut file = FileBlob::new(filename, data);
                if let Some(mime_type) = mime_type {
                    file = file.with_mime_type(mime_type);
                }
                form.file = Some(file);
            }
            "prompt" | "schema" | "api_key" | "apiKey" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Failed to read {name}: {e}")))?;
                let slot = match name.as_str() {
                    "prompt" => &mut form.prompt,
                    "schema" => &mut form.schema,
                    _ => &mut form.api_key,
                };
                *slot = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Uses the submitted schema when it parses and validates, else the receipt schema.
fn resolve_schema(raw: Option<&str>) -> Schema {
    let Some(raw) = raw else {
        return Schema::default();
    };
    match serde_json::from_str::<Schema>(raw) {
        Ok(schema) => match schema.validate() {
            Ok(()) => schema,
            Err(e) => {
                warn!(error = %e, "Custom schema is invalid, using default");
                Schema::default()
            }
        },
        Err(e) => {
            warn!(error = %e, "Error parsing custom schema, using default");
            Schema::default()
        }
    }
}

/// POST /api/process-image: extract one image outside the batch.
pub async fn process_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let form = read_form(multipart).await?;
    let (Some(file), Some(prompt)) = (form.file, form.prompt) else {
        return Err(AppError::bad_request("Missing file or prompt"));
    };
    let credential = state
        .credential(form.api_key.as_deref())
        .ok_or_else(|| AppError::bad_request("Missing API key"))?;
    let schema = resolve_schema(form.schema.as_deref());

    info!(filename = %file.filename, bytes = file.len(), "Processing single image");

    let raw = state
        .batch
        .extractor()
        .submit(&file, &prompt, &schema, &credential)
        .await?;

    let extraction = match raw {
        RawResponse::Fields(map) => {
            validate_response(&schema, &map).map_err(BatchVisionError::from)?
        }
        RawResponse::Rejected(message) => return Err(BatchVisionError::Rejected(message).into()),
    };
    let (fields, field_errors) = extraction.into_parts();

    Ok((
        StatusCode::OK,
        Json(ProcessImageResponse {
            filename: file.filename,
            fields,
            field_errors,
        }),
    ))
}
