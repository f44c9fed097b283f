//! TorchScript backend: GPT-2 style causal LM exported with `torch.jit.trace`.

use std::{fs, path::Path, sync::Arc, time::Instant};

use tch::{Device, IValue, Kind, Tensor, no_grad};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{
        CausalLm, ModelHandle, ModelLoader, ModelSource, SamplingParams,
        source::{MODULE_FILE, TOKENIZER_FILE},
    },
};

pub struct TorchLoader {
    config: Arc<AppConfig>,
}

impl TorchLoader {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }
}

impl ModelLoader for TorchLoader {
    fn load(&self, source: &ModelSource) -> Result<ModelHandle, ServiceError> {
        let (tokenizer, module_path) = match source {
            ModelSource::TrainedArtifact(dir) => (
                Tokenizer::from_file(dir.join(TOKENIZER_FILE)),
                dir.join(MODULE_FILE),
            ),
            ModelSource::BaseModel(name) => (
                Tokenizer::from_pretrained(name, None),
                self.config.base_module_path.clone(),
            ),
        };
        let tokenizer = tokenizer.map_err(|e| {
            ServiceError::ModelUnavailable(format!("tokenizer for {source}: {e}"))
        })?;
        let model = TorchCausalLm::load(&module_path, self.config.device)?;
        debug!(
            module = %module_path.display(),
            size_bytes = model.size_bytes(),
            "torchscript module loaded"
        );

        Ok(ModelHandle::new(
            source.clone(),
            Arc::new(tokenizer),
            Arc::new(model),
        ))
    }
}

pub struct TorchCausalLm {
    device: Device,
    size_bytes: u64,
    module: tch::CModule,
}

impl TorchCausalLm {
    pub fn load(module_path: &Path, device: Device) -> Result<Self, ServiceError> {
        if !module_path.exists() {
            return Err(ServiceError::ModelUnavailable(format!(
                "model artifact missing: {}",
                module_path.display()
            )));
        }
        let size_bytes = fs::metadata(module_path)?.len();
        let mut module = tch::CModule::load_on_device(module_path, device)
            .map_err(|e| ServiceError::ModelUnavailable(e.to_string()))?;
        module.set_eval();

        Ok(Self {
            device,
            size_bytes,
            module,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    fn forward_last_logits(&self, ids: &[i64]) -> Result<Tensor, ServiceError> {
        let input = Tensor::from_slice(ids)
            .reshape([1, ids.len() as i64])
            .to(self.device);

        // Traced GPT-2 returns either the logits or a (logits, past) tuple.
        let output = self
            .module
            .forward_is(&[IValue::Tensor(input)])
            .map_err(|e| ServiceError::Generation(e.to_string()))?;
        let logits = match output {
            IValue::Tensor(t) => t,
            IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                IValue::Tensor(t) => t.shallow_clone(),
                _ => {
                    return Err(ServiceError::Generation(
                        "expected tensor as first tuple element".into(),
                    ));
                }
            },
            _ => {
                return Err(ServiceError::Generation(
                    "unexpected model output format".into(),
                ));
            }
        };

        // [1, seq_len, vocab] -> [vocab]
        Ok(logits.select(1, -1).squeeze().to_kind(Kind::Float))
    }
}

impl CausalLm for TorchCausalLm {
    fn generate(
        &self,
        input_ids: &[u32],
        params: &SamplingParams,
    ) -> Result<Vec<u32>, ServiceError> {
        if input_ids.is_empty() {
            return Err(ServiceError::Generation("empty prompt".into()));
        }
        if params.do_sample && params.temperature <= 0.0 {
            return Err(ServiceError::Generation(format!(
                "temperature must be positive, got {}",
                params.temperature
            )));
        }

        let mut ids: Vec<i64> = input_ids.iter().map(|&id| i64::from(id)).collect();
        let eos = params.eos_token_id.map(i64::from);
        let start = Instant::now();

        // `CModule` is `Sync`; concurrent requests share it without locking.
        no_grad(|| {
            for _ in 0..params.max_new_tokens {
                let logits = self.forward_last_logits(&ids)?;
                let next = next_token(&logits, params)?;
                ids.push(next);
                if Some(next) == eos {
                    break;
                }
            }
            Ok::<(), ServiceError>(())
        })?;

        debug!(
            prompt_tokens = input_ids.len(),
            new_tokens = ids.len() - input_ids.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "generation finished"
        );

        to_token_ids(ids)
    }
}

fn to_token_ids(ids: Vec<i64>) -> Result<Vec<u32>, ServiceError> {
    ids.into_iter()
        .map(|id| {
            u32::try_from(id)
                .map_err(|_| ServiceError::Generation(format!("token id out of range: {id}")))
        })
        .collect()
}

fn next_token(logits: &Tensor, params: &SamplingParams) -> Result<i64, ServiceError> {
    if !params.do_sample {
        return Ok(logits.argmax(-1, false).int64_value(&[]));
    }

    let scaled = logits / params.temperature;
    let vocab = scaled.size().last().copied().unwrap_or(0);
    let k = params.top_k as i64;
    let filtered = if k > 0 && k < vocab {
        let (top, _) = scaled.topk(k, -1, true, true);
        let threshold = top.min();
        scaled.masked_fill(&scaled.lt_tensor(&threshold), f64::NEG_INFINITY)
    } else {
        scaled
    };

    let probs = filtered.softmax(-1, Kind::Float);
    probs
        .f_multinomial(1, false)
        .map(|sample| sample.int64_value(&[0]))
        .map_err(|e| ServiceError::Generation(e.to_string()))
}
