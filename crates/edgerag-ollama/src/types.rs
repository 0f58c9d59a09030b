// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama REST API request and response types.

use serde::{Deserialize, Serialize};

/// Sampling options understood by the Ollama runner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelOptions {
    pub num_predict: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

/// A `POST /api/generate` request.
///
/// With no `prompt` the server only loads the model; with `keep_alive: 0`
/// it unloads it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub stream: bool,
    /// Base64-encoded images, sent before the prompt.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<i64>,
}

/// One line of a streamed `/api/generate` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    /// Set when the runner fails mid-stream.
    #[serde(default)]
    pub error: Option<String>,
}

/// `GET /api/tags` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTag {
    pub name: String,
}

/// Error body returned with non-2xx statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
}
