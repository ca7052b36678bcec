//! Thin client for the Ollama HTTP API.
//!
//! - `POST {base}/api/embed`: batch embeddings
//! - `POST {base}/api/generate`: non-streaming text generation
//!
//! Transient failures (connection refused, timeouts, 5xx, 429) are retried
//! with exponential backoff; everything else fails on the first attempt.
//! A generation timeout bounds the whole call, retries and backoff included.

use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::ServiceError;
use crate::traits::LanguageModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const BODY_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base: Url,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl OllamaClient {
    pub fn new(base: Url, request_timeout: Duration, retry: RetryPolicy) -> Self {
        let mut base = base;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Self {
            client: Client::new(),
            base,
            request_timeout,
            retry,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.ollama_url.clone(),
            config.request_timeout,
            config.retry,
        )
    }

    pub fn endpoint(&self) -> &str {
        self.base.as_str()
    }

    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbedRequest {
            model,
            input: inputs,
        };
        let response: EmbedResponse = self
            .with_retry("embed", || {
                self.post_json("api/embed", &request, self.request_timeout)
            })
            .await?;

        if response.embeddings.len() != inputs.len() {
            return Err(ServiceError::Decode(format!(
                "expected {} embeddings from model {model}, got {}",
                inputs.len(),
                response.embeddings.len()
            )));
        }

        debug!(model, count = inputs.len(), "embedded texts");
        Ok(response.embeddings)
    }

    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };
        let attempts =
            self.with_retry("generate", || self.post_json("api/generate", &request, timeout));
        let response: GenerateResponse = tokio::time::timeout(timeout, attempts)
            .await
            .map_err(|_| ServiceError::Timeout {
                endpoint: self.base.to_string(),
                seconds: timeout.as_secs(),
            })??;

        Ok(response.response)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ServiceError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay = ?delay,
                        error = %error,
                        "retrying model service call"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn post_json<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
        timeout: Duration,
    ) -> Result<Resp, ServiceError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.base.join(path)?;
        let response = self
            .client
            .post(url.clone())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|error| self.transport_error(error, timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| self.transport_error(error, timeout))?;

        if !status.is_success() {
            return Err(ServiceError::HttpStatus {
                status,
                url: url.to_string(),
                body: text.chars().take(BODY_SNIPPET_CHARS).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|error| ServiceError::Decode(error.to_string()))
    }

    fn transport_error(&self, error: reqwest::Error, timeout: Duration) -> ServiceError {
        if error.is_timeout() {
            ServiceError::Timeout {
                endpoint: self.base.to_string(),
                seconds: timeout.as_secs(),
            }
        } else {
            ServiceError::Unavailable {
                endpoint: self.base.to_string(),
                details: error.to_string(),
            }
        }
    }
}

/// Answer generation through an Ollama chat model, at temperature 0 so the
/// same prompt yields the same answer.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Arc<OllamaClient>,
    model: String,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(client: Arc<OllamaClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.client
            .generate(&self.model, prompt, 0.0, self.timeout)
            .await
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{closed_port, spawn};
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_backoff: Duration::from_millis(1),
        }
    }

    async fn echo_embeddings(Json(body): Json<Value>) -> Json<Value> {
        let count = body["input"].as_array().map(Vec::len).unwrap_or(0);
        let embeddings: Vec<Vec<f32>> = (0..count).map(|i| vec![i as f32, 1.0]).collect();
        Json(json!({ "embeddings": embeddings }))
    }

    #[tokio::test]
    async fn embed_returns_one_vector_per_input() {
        let url = spawn(Router::new().route("/api/embed", post(echo_embeddings))).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(0));

        let vectors = client
            .embed("nomic-embed-text", &["a".to_string(), "b".to_string()])
            .await
            .expect("embed should succeed");

        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0]]);
    }

    #[tokio::test]
    async fn generate_is_deterministic_and_non_streaming() {
        async fn handler(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
            if body["stream"] != json!(false) || body["options"]["temperature"] != json!(0.0) {
                return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad options" })));
            }
            (
                StatusCode::OK,
                Json(json!({ "response": format!("echo: {}", body["prompt"].as_str().unwrap_or("")) })),
            )
        }

        let url = spawn(Router::new().route("/api/generate", post(handler))).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(0));

        let text = client
            .generate("llama3", "hello", 0.0, Duration::from_secs(5))
            .await
            .expect("generate should succeed");
        assert_eq!(text, "echo: hello");
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        async fn flaky(State(calls): State<Arc<AtomicUsize>>) -> (StatusCode, Json<Value>) {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "loading" })));
            }
            (StatusCode::OK, Json(json!({ "response": "ready" })))
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/api/generate", post(flaky))
            .with_state(calls.clone());
        let url = spawn(router).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(3));

        let text = client
            .generate("llama3", "q", 0.0, Duration::from_secs(5))
            .await
            .expect("third attempt should succeed");
        assert_eq!(text, "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn generation_deadline_covers_all_retries() {
        async fn stalled(Json(_body): Json<Value>) -> Json<Value> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Json(json!({ "response": "too late" }))
        }

        let url = spawn(Router::new().route("/api/generate", post(stalled))).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(3));

        let started = std::time::Instant::now();
        let error = client
            .generate("llama3", "q", 0.0, Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        async fn missing(State(calls): State<Arc<AtomicUsize>>) -> (StatusCode, Json<Value>) {
            calls.fetch_add(1, Ordering::SeqCst);
            (StatusCode::NOT_FOUND, Json(json!({ "error": "model not found" })))
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/api/embed", post(missing))
            .with_state(calls.clone());
        let url = spawn(router).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(3));

        let error = client.embed("nope", &["x".to_string()]).await.unwrap_err();
        assert!(matches!(error, ServiceError::HttpStatus { status, .. } if status == StatusCode::NOT_FOUND));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let client = OllamaClient::new(closed_port().await, Duration::from_secs(2), fast_retry(1));
        let error = client.embed("m", &["x".to_string()]).await.unwrap_err();
        assert!(matches!(error, ServiceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn mismatched_embedding_count_is_a_decode_error() {
        async fn short(Json(_body): Json<Value>) -> Json<Value> {
            Json(json!({ "embeddings": [[1.0, 2.0]] }))
        }

        let url = spawn(Router::new().route("/api/embed", post(short))).await;
        let client = OllamaClient::new(url, Duration::from_secs(5), fast_retry(0));
        let error = client
            .embed("m", &["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::Decode(_)));
    }

    #[tokio::test]
    async fn generator_sends_its_model_name() {
        async fn handler(Json(body): Json<Value>) -> Json<Value> {
            Json(json!({ "response": body["model"].as_str().unwrap_or("") }))
        }

        let url = spawn(Router::new().route("/api/generate", post(handler))).await;
        let client = Arc::new(OllamaClient::new(url, Duration::from_secs(5), fast_retry(0)));
        let generator = OllamaGenerator::new(client, "llama3", Duration::from_secs(5));

        assert_eq!(generator.generate("hi").await.expect("generate"), "llama3");
        assert_eq!(generator.model_name(), "llama3");
    }

    #[test]
    fn base_path_is_preserved_when_joining() {
        let base = Url::parse("http://gateway.local/ollama").expect("url");
        let client = OllamaClient::new(base, Duration::from_secs(1), RetryPolicy::default());
        assert_eq!(client.endpoint(), "http://gateway.local/ollama/");
    }
}
