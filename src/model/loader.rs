use std::{ops::Deref, sync::Arc};

use tokenizers::Tokenizer;

use crate::{
    error::ServiceError,
    model::{ModelSource, SamplingParams},
};

/// GPT-2 family end-of-text marker.
pub const EOS_TOKEN: &str = "<|endoftext|>";

pub trait TextTokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ServiceError>;
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError>;
    fn eos_token_id(&self) -> Option<u32>;
}

pub trait CausalLm: Send + Sync {
    /// Returns `input_ids` followed by up to `params.max_new_tokens` new ids.
    fn generate(&self, input_ids: &[u32], params: &SamplingParams)
    -> Result<Vec<u32>, ServiceError>;
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, source: &ModelSource) -> Result<ModelHandle, ServiceError>;
}

/// Tokenizer and model loaded from one [`ModelSource`].
pub struct ModelHandle {
    source: ModelSource,
    tokenizer: Arc<dyn TextTokenizer>,
    model: Arc<dyn CausalLm>,
}

impl ModelHandle {
    pub fn new(
        source: ModelSource,
        tokenizer: Arc<dyn TextTokenizer>,
        model: Arc<dyn CausalLm>,
    ) -> Self {
        Self {
            source,
            tokenizer,
            model,
        }
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    pub fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    pub fn model(&self) -> &dyn CausalLm {
        self.model.as_ref()
    }
}

impl TextTokenizer for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ServiceError> {
        // Inherent methods live on the wrapped `TokenizerImpl`.
        let encoding = self
            .deref()
            .encode(text, true)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError> {
        self.deref()
            .decode(ids, skip_special_tokens)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.token_to_id(EOS_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORD_LEVEL: &str = r#"{
      "version": "1.0",
      "truncation": null,
      "padding": null,
      "added_tokens": [
        {"id": 0, "content": "<|endoftext|>", "single_word": false, "lstrip": false,
         "rstrip": false, "normalized": false, "special": true}
      ],
      "normalizer": null,
      "pre_tokenizer": {"type": "Whitespace"},
      "post_processor": null,
      "decoder": null,
      "model": {
        "type": "WordLevel",
        "vocab": {"<|endoftext|>": 0, "Product": 1, ":": 2, "Eco": 3, "Bottle": 4,
                  "Ad": 5, "[UNK]": 6},
        "unk_token": "[UNK]"
      }
    }"#;

    fn word_level() -> Tokenizer {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), WORD_LEVEL).unwrap();
        Tokenizer::from_file(tmp.path()).unwrap()
    }

    #[test]
    fn tokenizer_exposes_eos_marker() {
        assert_eq!(TextTokenizer::eos_token_id(&word_level()), Some(0));
    }

    #[test]
    fn decode_skips_special_tokens() {
        let tokenizer = word_level();
        let mut ids = TextTokenizer::encode(&tokenizer, "Product: Eco Bottle").unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        ids.push(0);

        let text = TextTokenizer::decode(&tokenizer, &ids, true).unwrap();
        assert!(text.contains("Eco Bottle"));
        assert!(!text.contains(EOS_TOKEN));
    }
}
