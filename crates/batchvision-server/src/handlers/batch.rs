use std::convert::Infallible;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tracing::{info, warn};

use batchvision_batch::EXPORT_FILENAME;
use batchvision_core::api_types::{
    AddFilesResponse, ResultsResponse, RunBatchRequest, RunBatchResponse,
};
use batchvision_core::{BatchSettings, FileBlob};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/batch: every tracked item with its state.
pub async fn get_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.batch.snapshot()))
}

/// POST /api/batch/files: add uploaded images to the batch as `Ready` items.
pub async fn add_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {e}")))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let mime_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(format!("Failed to read {filename}: {e}")))?;

        let mut file = FileBlob::new(filename, data);
        if let Some(mime_type) = mime_type {
            file = file.with_mime_type(mime_type);
        }
        files.push(file);
    }

    if files.is_empty() {
        return Err(AppError::bad_request("No files uploaded"));
    }

    let added = state.batch.add_files(files);
    info!(added = added.len(), "Files added to batch");

    Ok((
        StatusCode::CREATED,
        Json(AddFilesResponse {
            total: state.batch.item_count(),
            added,
        }),
    )
        .into_response())
}

/// DELETE /api/batch: drop all items and results.
pub async fn clear_batch(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.batch.clear_batch()?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/batch/run: process every item not yet `Done`.
/// Returns 202 Accepted immediately; progress arrives on the event stream.
pub async fn run_batch(
    State(state): State<AppState>,
    body: Option<Json<RunBatchRequest>>,
) -> Result<Response, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let credential = state
        .credential(request.api_key.as_deref())
        .ok_or_else(|| AppError::bad_request("Missing API key"))?;

    let (pending, _handle) = state.batch.spawn_run(credential)?;
    info!(pending, "Batch run accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(RunBatchResponse {
            status: "running".to_string(),
            pending,
            message: format!("Processing {pending} file(s) in the background"),
        }),
    )
        .into_response())
}

/// GET /api/batch/results: successful extractions in completion order.
pub async fn get_results(State(state): State<AppState>) -> impl IntoResponse {
    let results = state.batch.results();
    let total = results.len();
    (StatusCode::OK, Json(ResultsResponse { results, total }))
}

/// GET /api/batch/export: the results as a CSV download.
pub async fn export_csv(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        state.batch.export_csv(),
    )
}

/// GET /api/batch/settings
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.batch.settings()))
}

/// PUT /api/batch/settings: replace the prompt and schema used by later runs.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(settings): Json<BatchSettings>,
) -> Result<Response, AppError> {
    state.batch.update_settings(settings)?;
    info!("Batch settings updated");
    Ok((StatusCode::OK, Json(state.batch.settings())).into_response())
}

/// GET /api/batch/events: server-sent stream of batch changes.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.batch.subscribe()).filter_map(|message| match message {
        Ok(event) => match Event::default().event(event.name()).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                warn!(error = %e, "Failed to encode batch event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "Event subscriber lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
