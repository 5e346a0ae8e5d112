//! JSON-over-HTTP text generation adapter (generic HTTP, watsonx, OpenLLM).

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tokio::time::Instant;
use veritas_kernel::{BackendAdapter, BackendError, GenerationParams};

/// Endpoint used for OpenLLM registrations that name none.
pub const DEFAULT_OPENLLM_ENDPOINT: &str = "http://localhost:3000/generate";

/// POSTs `{prompt, temperature, max_tokens, ..params}` and reads the text
/// from `generated_text`, `result` or `results[0].generated_text`.
pub struct HttpBackend {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    extra: HashMap<String, Value>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: None,
            extra: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Sent as a bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Extra body fields merged into every call; they override the defaults.
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.extra = params;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, prompt: &str, params: &GenerationParams) -> Value {
        let mut body = Map::new();
        body.insert("prompt".into(), json!(prompt));
        body.insert("temperature".into(), json!(params.temperature));
        body.insert("max_tokens".into(), json!(params.max_tokens));
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    fn map_error(err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            BackendError::Network(err.to_string())
        } else {
            BackendError::Other(err.to_string())
        }
    }

    fn map_status(status: reqwest::StatusCode, message: String) -> BackendError {
        match status.as_u16() {
            401 | 403 => BackendError::Auth(message),
            429 => BackendError::RateLimited(message),
            code => BackendError::Api {
                status: code,
                message,
            },
        }
    }
}

/// Pull the generated text out of a provider response.
pub fn extract_text(data: &Value) -> Option<String> {
    let pick = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    pick(data.get("generated_text"))
        .or_else(|| pick(data.get("result")))
        .or_else(|| {
            pick(
                data.get("results")
                    .and_then(|r| r.get(0))
                    .and_then(|r| r.get("generated_text")),
            )
        })
}

#[async_trait]
impl BackendAdapter for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        prompt: &str,
        params: &GenerationParams,
        deadline: Instant,
    ) -> Result<String, BackendError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(BackendError::Timeout("deadline already passed".to_string()));
        }

        let mut req = self
            .client
            .post(&self.endpoint)
            .timeout(budget)
            .json(&self.body(prompt, params));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(Self::map_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(Self::map_error)?;
        if !status.is_success() {
            return Err(Self::map_status(status, text));
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;
        extract_text(&data).ok_or_else(|| {
            BackendError::InvalidResponse("response carries no generated text".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use std::time::Duration;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_extract_text_shapes() {
        assert_eq!(
            extract_text(&json!({"generated_text": "a"})).as_deref(),
            Some("a")
        );
        assert_eq!(extract_text(&json!({"result": "b"})).as_deref(), Some("b"));
        assert_eq!(
            extract_text(&json!({"results": [{"generated_text": "c"}]})).as_deref(),
            Some("c")
        );
        assert_eq!(extract_text(&json!({"generated_text": "", "result": "d"})).as_deref(), Some("d"));
        assert!(extract_text(&json!({"other": 1})).is_none());
    }

    #[tokio::test]
    async fn test_call_sends_prompt_and_bearer() {
        let app = Router::new().route(
            "/generate",
            post(|headers: HeaderMap, axum::Json(body): axum::Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                axum::Json(json!({
                    "generated_text": format!(
                        "{}|{}|{}",
                        body["prompt"].as_str().unwrap_or_default(),
                        body["decoding"].as_str().unwrap_or_default(),
                        auth
                    )
                }))
            }),
        );
        let base = serve(app).await;
        let backend = HttpBackend::new("watsonx", format!("{base}/generate"))
            .with_api_key("secret")
            .with_params(HashMap::from([("decoding".to_string(), json!("greedy"))]));

        let text = backend
            .call("hello", &GenerationParams::default(), deadline())
            .await
            .unwrap();
        assert_eq!(text, "hello|greedy|Bearer secret");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let app = Router::new()
            .route("/down", post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }))
            .route("/denied", post(|| async { (StatusCode::UNAUTHORIZED, "no") }))
            .route("/empty", post(|| async { axum::Json(json!({"status": "ok"})) }));
        let base = serve(app).await;
        let params = GenerationParams::default();

        let err = HttpBackend::new("h", format!("{base}/down"))
            .call("p", &params, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 503, .. }));
        assert!(err.is_retryable());

        let err = HttpBackend::new("h", format!("{base}/denied"))
            .call("p", &params, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Auth(_)));

        let err = HttpBackend::new("h", format!("{base}/empty"))
            .call("p", &params, deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = HttpBackend::new("h", format!("http://{addr}/generate"))
            .call("p", &GenerationParams::default(), deadline())
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err:?}");
    }
}
