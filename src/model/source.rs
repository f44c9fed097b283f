use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::config::AppConfig;

pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const MODULE_FILE: &str = "model.ts";

/// Where the serving model comes from. Decided once, on first load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    TrainedArtifact(PathBuf),
    BaseModel(String),
}

impl ModelSource {
    pub fn resolve(config: &AppConfig) -> Self {
        let dir = config.trained_model_path.as_path();
        if !dir.exists() {
            return ModelSource::BaseModel(config.base_model.clone());
        }

        let missing = missing_artifact_files(dir);
        if missing.is_empty() {
            ModelSource::TrainedArtifact(dir.to_path_buf())
        } else {
            warn!(
                path = %dir.display(),
                ?missing,
                base_model = %config.base_model,
                "trained artifact incomplete, using base model"
            );
            ModelSource::BaseModel(config.base_model.clone())
        }
    }

    pub fn is_trained(&self) -> bool {
        matches!(self, ModelSource::TrainedArtifact(_))
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::TrainedArtifact(path) => write!(f, "{}", path.display()),
            ModelSource::BaseModel(name) => f.write_str(name),
        }
    }
}

fn missing_artifact_files(dir: &Path) -> Vec<&'static str> {
    [TOKENIZER_FILE, MODULE_FILE]
        .into_iter()
        .filter(|name| !dir.join(name).is_file())
        .collect()
}
