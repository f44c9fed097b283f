use std::{sync::Arc, time::Instant};

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{ModelHandle, ModelLoader, ModelSource},
};

/// Owns the process-wide model handle.
///
/// The first successful [`resolve_and_load`](Self::resolve_and_load) caches
/// the handle for the provider's lifetime. Callers racing that first load
/// block until it finishes and share its result. A failed load caches nothing.
pub struct ModelProvider {
    config: Arc<AppConfig>,
    loader: Arc<dyn ModelLoader>,
    handle: OnceCell<Arc<ModelHandle>>,
}

impl ModelProvider {
    pub fn new(config: Arc<AppConfig>, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            handle: OnceCell::new(),
        }
    }

    pub fn resolve_and_load(&self) -> Result<Arc<ModelHandle>, ServiceError> {
        self.handle
            .get_or_try_init(|| {
                let source = ModelSource::resolve(&self.config);
                info!(%source, trained = source.is_trained(), "loading model");

                let start = Instant::now();
                let handle = self.loader.load(&source).map_err(|err| {
                    warn!(%source, error = %err, "model load failed");
                    match err {
                        ServiceError::ModelUnavailable(_) => err,
                        other => ServiceError::ModelUnavailable(other.to_string()),
                    }
                })?;

                info!(%source, elapsed_ms = start.elapsed().as_millis(), "model ready");
                Ok(Arc::new(handle))
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.get().is_some()
    }

    /// Source of the cached handle, if loaded.
    pub fn source(&self) -> Option<&ModelSource> {
        self.handle.get().map(|handle| handle.source())
    }
}
