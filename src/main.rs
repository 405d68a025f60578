use std::sync::Arc;

use francis_diag::{
    config::AppConfig,
    model::TorchClassifier,
    pipeline::AppContext,
    server,
    types::{SensorReading, N_CHANNELS},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;

    let classifier = TorchClassifier::load(&cfg.model_path, cfg.window_len, N_CHANNELS, cfg.class_count)?;
    tracing::info!(path = %cfg.model_path, window = cfg.window_len, classes = cfg.class_count, "loaded model");

    let ctx = AppContext::from_config(&cfg, Arc::new(classifier))?;

    // Warmup through the full classification path
    let warm = ctx.classify(&SensorReading::new([0.0; N_CHANNELS]))?;
    tracing::info!(stage = warm.stage, "warmup forward ok");

    let app = server::router(Arc::new(ctx));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
