use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

#[cfg(feature = "tch-backend")]
use tch::Device;

pub const DEFAULT_TRAINED_MODEL_PATH: &str = "models/ad_model";
pub const DEFAULT_BASE_MODEL: &str = "distilgpt2";
pub const DEFAULT_BASE_MODULE_PATH: &str = "models/distilgpt2_baseline.ts";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    /// Directory written by the training pipeline (`tokenizer.json` + `model.ts`).
    pub trained_model_path: PathBuf,
    /// Hub identifier used for the tokenizer when no trained artifact exists.
    pub base_model: String,
    /// TorchScript export of the base model.
    pub base_module_path: PathBuf,
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_k: usize,
    pub do_sample: bool,
    pub preload_model: bool,
    #[cfg(feature = "tch-backend")]
    pub device: Device,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            trained_model_path: PathBuf::from(DEFAULT_TRAINED_MODEL_PATH),
            base_model: DEFAULT_BASE_MODEL.to_string(),
            base_module_path: PathBuf::from(DEFAULT_BASE_MODULE_PATH),
            max_new_tokens: 40,
            temperature: 0.85,
            top_k: 50,
            do_sample: true,
            preload_model: false,
            #[cfg(feature = "tch-backend")]
            device: Device::Cpu,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let listen_addr = match env::var("SERVER_ADDR") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid SERVER_ADDR {raw:?}: {e}"))?,
            Err(_) => defaults.listen_addr,
        };

        let trained_model_path = env::var("TRAINED_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.trained_model_path);
        let base_model = env::var("BASE_MODEL").unwrap_or(defaults.base_model);
        let base_module_path = env::var("BASE_MODULE_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.base_module_path);

        let max_new_tokens = parse_var("MAX_NEW_TOKENS").unwrap_or(defaults.max_new_tokens);
        let temperature = parse_var("TEMPERATURE").unwrap_or(defaults.temperature);
        let top_k = parse_var("TOP_K").unwrap_or(defaults.top_k);
        let do_sample = env::var("DO_SAMPLE")
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.do_sample);
        let preload_model = env::var("PRELOAD_MODEL")
            .ok()
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.preload_model);

        if do_sample && temperature <= 0.0 {
            anyhow::bail!("TEMPERATURE must be positive when sampling, got {temperature}");
        }

        #[cfg(feature = "tch-backend")]
        let device = {
            let raw = env::var("DEVICE").unwrap_or_else(|_| "cpu".into());
            parse_device(&raw)
        };

        Ok(Self {
            listen_addr,
            trained_model_path,
            base_model,
            base_module_path,
            max_new_tokens,
            temperature,
            top_k,
            do_sample,
            preload_model,
            #[cfg(feature = "tch-backend")]
            device,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(feature = "tch-backend")]
fn parse_device(raw: &str) -> Device {
    let lower = raw.to_lowercase();
    if lower == "cpu" {
        Device::Cpu
    } else if lower.starts_with("cuda") {
        let idx = lower
            .split(':')
            .nth(1)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        if tch::Cuda::is_available() {
            Device::Cuda(idx)
        } else {
            tracing::warn!(requested = %raw, "CUDA unavailable, falling back to CPU");
            Device::Cpu
        }
    } else {
        Device::Cpu
    }
}
