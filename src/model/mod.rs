mod loader;
mod provider;
pub mod source;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use loader::{CausalLm, EOS_TOKEN, ModelHandle, ModelLoader, TextTokenizer};
pub use provider::ModelProvider;
pub use source::ModelSource;
pub use types::{GenerationResult, SamplingParams};
