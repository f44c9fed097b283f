use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{ModelProvider, SamplingParams},
};

/// Two-line prompt: the product, then the `Ad:` cue the model continues.
pub fn format_prompt(product_name: &str) -> String {
    format!("Product: {product_name}\nAd:")
}

pub struct GenerationEngine {
    provider: Arc<ModelProvider>,
    params: SamplingParams,
}

impl GenerationEngine {
    pub fn new(provider: Arc<ModelProvider>, config: &AppConfig) -> Self {
        Self {
            provider,
            params: SamplingParams::from_config(config),
        }
    }

    pub fn provider(&self) -> &Arc<ModelProvider> {
        &self.provider
    }

    /// Blocking. Loads the model on first use. The decoded text keeps the
    /// prompt and drops special tokens.
    pub fn generate(&self, product_name: &str) -> Result<String, ServiceError> {
        let handle = self.provider.resolve_and_load()?;
        let tokenizer = handle.tokenizer();

        let prompt = format_prompt(product_name);
        let input_ids = tokenizer.encode(&prompt)?;
        let params = self.params.clone().with_eos(tokenizer.eos_token_id());

        let output_ids = handle.model().generate(&input_ids, &params)?;
        tokenizer.decode(&output_ids, true)
    }
}
