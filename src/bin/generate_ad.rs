//! Prints one generated ad, e.g. `generate_ad "Eco Bottle"`.

use std::sync::Arc;

use ad_copy_service::{
    AppConfig, GenerationEngine, ModelProvider, init_tracing, model::tch_backend::TorchLoader,
};

fn main() -> anyhow::Result<()> {
    init_tracing();

    let product = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Dairy Chocolate".to_string());

    let config = Arc::new(AppConfig::from_env()?);
    let loader = Arc::new(TorchLoader::new(config.clone()));
    let provider = Arc::new(ModelProvider::new(config.clone(), loader));
    let engine = GenerationEngine::new(provider, config.as_ref());

    let ad = engine.generate(&product)?;
    let rule = "=".repeat(30);
    println!("\n{rule}\n{ad}\n{rule}\n");

    Ok(())
}
