pub mod config;
pub mod error;
pub mod generation;
pub mod metrics;
pub mod model;
pub mod server;

pub use config::AppConfig;
pub use error::ServiceError;
pub use generation::{GenerationEngine, format_prompt};
pub use metrics::Metrics;
pub use model::{GenerationResult, ModelHandle, ModelLoader, ModelProvider, ModelSource};
pub use server::build_router;

/// Installs the global subscriber unless one is already set.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if tracing::dispatcher::has_been_set() {
        return;
    }
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,hyper=warn,axum::rejection=trace".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
