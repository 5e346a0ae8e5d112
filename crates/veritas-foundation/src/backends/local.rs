use async_trait::async_trait;
use tokio::time::Instant;
use veritas_kernel::{BackendAdapter, BackendError, GenerationParams};

/// Offline placeholder: answers `[local:<model_id>] <prompt>`.
///
/// Useful for dry runs and wiring checks without a model server.
#[derive(Debug, Clone)]
pub struct LocalEchoBackend {
    model_id: String,
}

impl LocalEchoBackend {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl BackendAdapter for LocalEchoBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn call(
        &self,
        prompt: &str,
        _params: &GenerationParams,
        _deadline: Instant,
    ) -> Result<String, BackendError> {
        Ok(format!("[local:{}] {}", self.model_id, prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_format() {
        let backend = LocalEchoBackend::new("tiny");
        let out = backend
            .call("hi", &GenerationParams::default(), Instant::now())
            .await
            .unwrap();
        assert_eq!(out, "[local:tiny] hi");
    }
}
