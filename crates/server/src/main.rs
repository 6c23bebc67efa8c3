use std::sync::Arc;

use receipta_ocr::ReceiptPipeline;
use tokio::net::TcpListener;

mod settings;
mod routes;
mod telemetry;

use settings::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;
    telemetry::init(config.log_format);

    tracing::info!("Starting receipt OCR server");

    let pipeline = ReceiptPipeline::new(recognizer(&config).await?)
        .with_timeout(config.recognition_timeout());
    let app = routes::router(Arc::new(pipeline), config.max_body_bytes);

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(feature = "textract")]
async fn recognizer(
    config: &ServerConfig,
) -> anyhow::Result<receipta_ocr::recognizer::textract_backend::TextractDetector> {
    use receipta_ocr::recognizer::textract_backend::TextractDetector;

    let detector = TextractDetector::from_env(config.aws_region.clone()).await;
    tracing::info!(
        "Textract client ready (region: {})",
        config.aws_region.as_deref().unwrap_or("default chain")
    );
    Ok(detector)
}

#[cfg(not(feature = "textract"))]
async fn recognizer(_config: &ServerConfig) -> anyhow::Result<receipta_ocr::MockDetector> {
    anyhow::bail!("No recognition backend: rebuild with the `textract` feature")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
