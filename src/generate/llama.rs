use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::generate::{GenerationRequest, Generator};

/// Talks to a llama.cpp server (hosting a quantized GGUF model) through its
/// OpenAI-compatible `/v1/completions` endpoint.
pub struct LlamaServerGenerator {
    client: Client,
    endpoint: String,
    model: Option<String>,
    timeout: Duration,
}

impl LlamaServerGenerator {
    pub fn new(base_url: &str, model: Option<String>, timeout: Duration) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::Generation("missing llama server URL".to_string()));
        }
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Generation(format!("failed to build HTTP client: {e}")))?;
        let endpoint = format!("{}/v1/completions", base_url.trim().trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            model,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::GenerationTimeout(self.timeout.as_secs())
        } else {
            Error::Generation(format!("llama server request failed: {err}"))
        }
    }
}

#[async_trait]
impl Generator for LlamaServerGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let body = CompletionRequest {
            model: self.model.as_deref(),
            prompt: request.prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: request.stop,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Generation(format!("llama server returned {status}: {text}")));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| Error::Generation(format!("failed to parse llama server response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .ok_or_else(|| Error::Generation("llama server returned no choices".to_string()))
    }

    fn name(&self) -> &str {
        "llama-server"
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    max_tokens: usize,
    temperature: f32,
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request<'a>(prompt: &'a str) -> GenerationRequest<'a> {
        GenerationRequest {
            prompt,
            max_tokens: 16,
            temperature: 0.0,
            stop: &["</s>"],
        }
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let app = Router::new().route(
            "/v1/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["max_tokens"], 16);
                assert_eq!(body["stop"][0], "</s>");
                Json(json!({ "choices": [{ "text": "  Blue.  " }] }))
            }),
        );
        let url = serve(app).await;
        let generator = LlamaServerGenerator::new(&url, None, Duration::from_secs(5)).unwrap();
        assert_eq!(generator.generate(&request("hi")).await.unwrap(), "Blue.");
    }

    #[tokio::test]
    async fn non_success_status_is_a_generation_error() {
        let app = Router::new().route(
            "/v1/completions",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "loading model") }),
        );
        let url = serve(app).await;
        let generator = LlamaServerGenerator::new(&url, None, Duration::from_secs(5)).unwrap();
        let err = generator.generate(&request("hi")).await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("503")), "{err}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let app = Router::new().route(
            "/v1/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "choices": [] }))
            }),
        );
        let url = serve(app).await;
        let generator = LlamaServerGenerator::new(&url, None, Duration::from_millis(200)).unwrap();
        let err = generator.generate(&request("hi")).await.unwrap_err();
        assert!(matches!(err, Error::GenerationTimeout(_)), "{err}");
    }

    #[test]
    fn endpoint_is_normalised() {
        let generator =
            LlamaServerGenerator::new("http://localhost:8080/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(generator.endpoint(), "http://localhost:8080/v1/completions");
    }
}
