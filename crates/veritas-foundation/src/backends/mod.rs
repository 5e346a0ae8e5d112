//! Backend adapters for the supported provider families.

pub mod http;
pub mod local;

pub use http::HttpBackend;
pub use local::LocalEchoBackend;

use crate::config::{BackendConfig, ProviderKind};
use std::sync::Arc;
use veritas_kernel::BackendAdapter;
use veritas_kernel::config::{ConfigError, ConfigResult};

/// Build the adapter a registration's `provider` calls for.
pub fn create_backend(config: &BackendConfig) -> ConfigResult<Arc<dyn BackendAdapter>> {
    let adapter: Arc<dyn BackendAdapter> = match config.provider {
        ProviderKind::Local => Arc::new(LocalEchoBackend::new(&config.model_id)),
        ProviderKind::Openllm => Arc::new(http_backend(
            "openllm",
            config,
            config
                .endpoint
                .as_deref()
                .unwrap_or(http::DEFAULT_OPENLLM_ENDPOINT),
        )),
        ProviderKind::Http | ProviderKind::Watsonx => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                ConfigError::Invalid(format!("model '{}' has no endpoint", config.model_id))
            })?;
            let name = if config.provider == ProviderKind::Watsonx {
                "watsonx"
            } else {
                "http"
            };
            Arc::new(http_backend(name, config, endpoint))
        }
    };
    Ok(adapter)
}

fn http_backend(name: &str, config: &BackendConfig, endpoint: &str) -> HttpBackend {
    let mut backend = HttpBackend::new(name, endpoint).with_params(config.params.clone());
    if let Some(key) = &config.api_key {
        backend = backend.with_api_key(key);
    }
    backend
}
