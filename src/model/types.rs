use serde::Serialize;

use crate::config::AppConfig;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationResult {
    pub product_name: String,
    pub generated_ad: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f64,
    /// `0` disables top-k filtering.
    pub top_k: usize,
    /// Generation stops after emitting this id.
    pub eos_token_id: Option<u32>,
}

impl SamplingParams {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_new_tokens: config.max_new_tokens,
            do_sample: config.do_sample,
            temperature: config.temperature,
            top_k: config.top_k,
            eos_token_id: None,
        }
    }

    pub fn with_eos(mut self, eos_token_id: Option<u32>) -> Self {
        self.eos_token_id = eos_token_id;
        self
    }
}
