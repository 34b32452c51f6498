use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Batch
        .route(
            "/api/batch",
            get(handlers::batch::get_snapshot).delete(handlers::batch::clear_batch),
        )
        .route(
            "/api/batch/files",
            post(handlers::batch::add_files).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/batch/run", post(handlers::batch::run_batch))
        .route("/api/batch/results", get(handlers::batch::get_results))
        .route("/api/batch/export", get(handlers::batch::export_csv))
        .route(
            "/api/batch/settings",
            get(handlers::batch::get_settings).put(handlers::batch::update_settings),
        )
        .route("/api/batch/events", get(handlers::batch::events))
        // Schema
        .route("/api/schema/generate", post(handlers::schema::generate_schema))
        // Single image
        .route(
            "/api/process-image",
            post(handlers::process::process_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}
