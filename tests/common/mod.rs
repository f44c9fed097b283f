#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use ad_copy_service::{
    AppConfig, GenerationEngine, Metrics, ModelHandle, ModelLoader, ModelProvider, ModelSource,
    ServiceError, build_router,
    model::{CausalLm, SamplingParams, TextTokenizer},
};
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};

pub const EOS: u32 = 0;
pub const CONTINUATION: &str = " Refreshingly good.";

/// One token per byte, EOS is id 0.
pub struct ByteTokenizer;

impl TextTokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ServiceError> {
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError> {
        let bytes: Vec<u8> = ids
            .iter()
            .filter(|&&id| !(skip_special_tokens && id == EOS))
            .map(|&id| id as u8)
            .collect();
        String::from_utf8(bytes).map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }
}

pub enum Behaviour {
    Continue,
    Fail,
    Panic,
}

pub struct FakeModel(pub Behaviour);

impl CausalLm for FakeModel {
    fn generate(
        &self,
        input_ids: &[u32],
        params: &SamplingParams,
    ) -> Result<Vec<u32>, ServiceError> {
        match self.0 {
            Behaviour::Continue => {
                let mut out = input_ids.to_vec();
                out.extend(
                    CONTINUATION
                        .bytes()
                        .map(u32::from)
                        .take(params.max_new_tokens),
                );
                out.extend(params.eos_token_id);
                Ok(out)
            }
            Behaviour::Fail => Err(ServiceError::Generation("sampling diverged".into())),
            Behaviour::Panic => panic!("kernel exploded"),
        }
    }
}

pub struct CountingLoader {
    pub loads: AtomicUsize,
    pub fail_first: usize,
    pub delay: Duration,
    model: Arc<FakeModel>,
}

impl CountingLoader {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            fail_first: 0,
            delay: Duration::ZERO,
            model: Arc::new(FakeModel(behaviour)),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, source: &ModelSource) -> Result<ModelHandle, ServiceError> {
        let attempt = self.loads.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        if attempt < self.fail_first {
            return Err(ServiceError::ModelUnavailable(format!(
                "no weights found for {source}"
            )));
        }
        Ok(ModelHandle::new(
            source.clone(),
            Arc::new(ByteTokenizer),
            self.model.clone(),
        ))
    }
}

pub struct TestApp {
    pub router: Router,
    pub metrics: Arc<Metrics>,
    pub provider: Arc<ModelProvider>,
    pub loader: Arc<CountingLoader>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        trained_model_path: PathBuf::from("target/ad-copy-service-tests/no-such-model"),
        ..AppConfig::default()
    }
}

pub fn app_with(loader: CountingLoader) -> TestApp {
    let config = Arc::new(test_config());
    let loader = Arc::new(loader);
    let provider = Arc::new(ModelProvider::new(config.clone(), loader.clone()));
    let engine = Arc::new(GenerationEngine::new(provider.clone(), config.as_ref()));
    let metrics = Arc::new(Metrics::new().unwrap());
    let router = build_router(engine, metrics.clone());
    TestApp {
        router,
        metrics,
        provider,
        loader,
    }
}

pub fn app() -> TestApp {
    app_with(CountingLoader::new(Behaviour::Continue))
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    post_raw(uri, serde_json::to_vec(&body).unwrap())
}

pub fn post_raw(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
