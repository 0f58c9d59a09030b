// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for a local Ollama server.
//!
//! Provides [`OllamaClient`] which handles model residency (load / unload),
//! streaming generation, and one retry for transient server errors.

use std::time::Duration;

use edgerag_core::EdgeRagError;
use tracing::{debug, warn};

use crate::ndjson::{self, ChunkStream};
use crate::types::{ApiErrorResponse, GenerateRequest, TagsResponse};

/// HTTP client for Ollama API communication.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl OllamaClient {
    /// Creates a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EdgeRagError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeRagError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of the models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, EdgeRagError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let tags: TagsResponse = response.json().await.map_err(|e| EdgeRagError::Backend {
            message: format!("failed to parse model list: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Loads `model` into memory without generating.
    pub async fn load_model(&self, model: &str) -> Result<(), EdgeRagError> {
        let request = GenerateRequest {
            model: model.to_string(),
            ..GenerateRequest::default()
        };
        self.post_generate(&request).await?;
        debug!(model, "model loaded");
        Ok(())
    }

    /// Evicts `model` from memory.
    pub async fn unload_model(&self, model: &str) -> Result<(), EdgeRagError> {
        let request = GenerateRequest {
            model: model.to_string(),
            keep_alive: Some(0),
            ..GenerateRequest::default()
        };
        self.post_generate(&request).await?;
        debug!(model, "model unloaded");
        Ok(())
    }

    /// Starts a streaming generation.
    ///
    /// On transient errors (429, 503), retries once after a 1-second delay.
    pub async fn generate_stream(&self, request: &GenerateRequest) -> Result<ChunkStream, EdgeRagError> {
        let mut req = request.clone();
        req.stream = true;
        let response = self.post_generate(&req).await?;
        Ok(ndjson::decode_response(response))
    }

    async fn post_generate(&self, request: &GenerateRequest) -> Result<reqwest::Response, EdgeRagError> {
        let url = format!("{}/api/generate", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying generate request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&url)
                .json(request)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();
            debug!(status = %status, attempt, model = %request.model, "generate response received");

            if status.is_success() {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            let err = api_error(status, &body);
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error.unwrap_or_else(|| EdgeRagError::backend("generate request failed after retries")))
    }
}

fn transport_error(e: reqwest::Error) -> EdgeRagError {
    EdgeRagError::Backend {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Maps an error response, recognizing memory exhaustion.
pub(crate) fn api_error(status: reqwest::StatusCode, body: &str) -> EdgeRagError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("server returned {status}: {body}"));
    if status == reqwest::StatusCode::INSUFFICIENT_STORAGE || is_memory_message(&message) {
        return EdgeRagError::OutOfMemory(message);
    }
    EdgeRagError::backend(message)
}

pub(crate) fn is_memory_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("out of memory") || lower.contains("more system memory")
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: reqwest::StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn list_models_returns_names() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "gemma3n:e4b"}, {"name": "llava:7b"}]
            })))
            .mount(&server)
            .await;

        let models = test_client(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["gemma3n:e4b", "llava:7b"]);
    }

    #[tokio::test]
    async fn unload_sends_zero_keep_alive() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"model": "m", "keep_alive": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .expect(1)
            .mount(&server)
            .await;

        test_client(&server).unload_model("m").await.unwrap();
    }

    #[tokio::test]
    async fn retries_once_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({"error": "busy"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"done": true})))
            .mount(&server)
            .await;

        test_client(&server).load_model("m").await.unwrap();
    }

    #[tokio::test]
    async fn memory_errors_map_to_out_of_memory() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "model requires more system memory (7.6 GiB) than is available (3.1 GiB)"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).load_model("big").await.unwrap_err();
        assert!(err.is_out_of_memory(), "got: {err}");
    }

    #[tokio::test]
    async fn other_errors_keep_the_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model 'nope' not found"
            })))
            .mount(&server)
            .await;

        let err = test_client(&server).load_model("nope").await.unwrap_err();
        assert!(!err.is_out_of_memory());
        assert!(err.to_string().contains("model 'nope' not found"), "got: {err}");
    }

    #[test]
    fn insufficient_storage_is_out_of_memory() {
        let err = api_error(reqwest::StatusCode::INSUFFICIENT_STORAGE, "");
        assert!(err.is_out_of_memory());
    }
}
