use common::{TelemetryGuard, setup_logging};
use detector::backend::ort::OrtBackend;
use detector::{DetectionPipeline, ModelHandle};
use server::{AppState, ServerConfig, routes};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init("object-detection-server", endpoint)?),
        None => None,
    };
    setup_logging(config.log_level.clone(), config.environment.clone());

    let handle = Arc::new(ModelHandle::<OrtBackend>::new(
        config.detector.model_path.clone(),
    ));
    let pipeline = Arc::new(DetectionPipeline::new(config.detector.clone(), handle));

    // A failed load leaves the server up; predict answers 503 until an
    // operator restarts with a valid artifact
    if let Err(e) = pipeline.load_model().await {
        tracing::error!(error = %e, "Startup model load failed, serving unhealthy");
    }

    let app = routes::app(AppState { pipeline });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, environment = config.environment.as_str(), "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
