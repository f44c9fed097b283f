use std::sync::Arc;

use tokio::{net::TcpListener, task};

use ad_copy_service::{
    AppConfig, GenerationEngine, Metrics, ModelProvider, build_router, init_tracing,
    model::tch_backend::TorchLoader,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(
        trained_model_path = %config.trained_model_path.display(),
        base_model = %config.base_model,
        "configuration loaded"
    );

    let loader = Arc::new(TorchLoader::new(config.clone()));
    let provider = Arc::new(ModelProvider::new(config.clone(), loader));
    let engine = Arc::new(GenerationEngine::new(provider.clone(), config.as_ref()));
    let metrics = Arc::new(Metrics::new()?);

    if config.preload_model {
        task::spawn_blocking(move || match provider.resolve_and_load() {
            Ok(handle) => tracing::info!(source = %handle.source(), "model preloaded"),
            Err(err) => tracing::warn!(error = %err, "preload failed, will retry on first request"),
        });
    }

    let router = build_router(engine, metrics);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router).await?;

    Ok(())
}
