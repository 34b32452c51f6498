use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use batchvision_batch::BatchController;
use batchvision_core::{AppConfig, Extractor};
use batchvision_extraction::{OpenAiExtractor, SchemaGenerator};

mod error;
mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("batchvision=info".parse()?))
        .init();

    let config = AppConfig::from_env();
    let host = config.server_host.clone();
    let port = config.server_port;

    if config.api_key().is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; requests must supply their own key");
    }

    let extractor: Arc<dyn Extractor> = Arc::new(OpenAiExtractor::new(&config)?);
    let batch = Arc::new(BatchController::new(extractor, config.batch_concurrency));
    let schema_generator = Arc::new(SchemaGenerator::new(&config)?);

    let app = routes::create_router(config.max_upload_bytes)
        .with_state(AppState {
            config: Arc::new(config),
            batch,
            schema_generator,
        })
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    tracing::info!("Batchvision server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
