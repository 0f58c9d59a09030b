// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ollama-served language model backends for edgerag.
//!
//! [`OllamaBackendFactory`] implements [`BackendFactory`]: the persistent
//! text backend streams `/api/generate` as [`StreamingIncrement::Delta`]
//! pieces, while multimodal sessions attach base64 images and report
//! [`StreamingIncrement::Cumulative`] progress (the full text so far).
//! Releasing a backend evicts its model from server memory.

pub mod client;
pub mod ndjson;
pub mod types;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use edgerag_config::EdgeRagConfig;
use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::{
    BackendFactory, InferenceBackend, MultimodalBackend, MultimodalSession, PluginAdapter,
};
use edgerag_core::types::{
    AdapterType, GenerationParams, HealthStatus, IncrementStream, MultimodalOptions, RawImage,
    SessionOptions, StreamingIncrement,
};
use futures::stream::StreamExt;
use tracing::{debug, info, warn};

use crate::client::OllamaClient;
use crate::ndjson::ChunkStream;
use crate::types::{GenerateChunk, GenerateRequest, ModelOptions};

fn model_options(params: &GenerationParams) -> ModelOptions {
    ModelOptions {
        num_predict: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        top_k: params.top_k,
    }
}

/// Text carried by a chunk, or the error it reports.
fn chunk_text(chunk: Result<GenerateChunk, EdgeRagError>) -> Result<String, EdgeRagError> {
    let chunk = chunk?;
    if let Some(error) = chunk.error {
        if client::is_memory_message(&error) {
            return Err(EdgeRagError::OutOfMemory(error));
        }
        return Err(EdgeRagError::backend(error));
    }
    if chunk.done {
        debug!(
            reason = chunk.done_reason.as_deref().unwrap_or("unknown"),
            tokens = chunk.eval_count.unwrap_or(0),
            "generation finished"
        );
    }
    Ok(chunk.response)
}

fn delta_increments(chunks: ChunkStream) -> IncrementStream {
    Box::pin(chunks.filter_map(|chunk| async move {
        match chunk_text(chunk) {
            Ok(text) if text.is_empty() => None,
            Ok(text) => Some(Ok(StreamingIncrement::Delta(text))),
            Err(e) => Some(Err(e)),
        }
    }))
}

fn cumulative_increments(chunks: ChunkStream) -> IncrementStream {
    Box::pin(
        chunks
            .scan(String::new(), |so_far, chunk| {
                let item = match chunk_text(chunk) {
                    Ok(text) if text.is_empty() => None,
                    Ok(text) => {
                        so_far.push_str(&text);
                        Some(Ok(StreamingIncrement::Cumulative(so_far.clone())))
                    }
                    Err(e) => Some(Err(e)),
                };
                futures::future::ready(Some(item))
            })
            .filter_map(futures::future::ready),
    )
}

/// Builds Ollama backends from configuration.
pub struct OllamaBackendFactory {
    client: OllamaClient,
    text_model: String,
    text_params: GenerationParams,
    vision_model: String,
    vision_max_tokens: u32,
    vision_top_k: u32,
    max_images: u32,
}

impl OllamaBackendFactory {
    pub fn from_config(config: &EdgeRagConfig) -> Result<Self, EdgeRagError> {
        let client = OllamaClient::new(
            &config.backend.base_url,
            Duration::from_secs(config.backend.request_timeout_secs),
        )?;
        Ok(Self {
            client,
            text_model: config.backend.model.clone(),
            text_params: GenerationParams {
                max_tokens: config.backend.max_tokens,
                temperature: config.backend.temperature,
                top_p: config.backend.top_p,
                top_k: config.backend.top_k,
            },
            vision_model: config.multimodal_model().to_string(),
            vision_max_tokens: config.multimodal.max_tokens,
            vision_top_k: config.multimodal.top_k,
            max_images: config.multimodal.max_images,
        })
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    /// Fails with an initialization error if `model` is not installed.
    async fn ensure_installed(&self, model: &str) -> Result<(), EdgeRagError> {
        let installed = self.client.list_models().await?;
        if installed.iter().any(|m| m == model) {
            return Ok(());
        }
        Err(EdgeRagError::Initialization {
            component: "language model".to_string(),
            message: format!("model '{model}' is not installed (run `ollama pull {model}`)"),
        })
    }
}

#[async_trait]
impl BackendFactory for OllamaBackendFactory {
    async fn load_text_backend(&self) -> Result<Box<dyn InferenceBackend>, EdgeRagError> {
        self.ensure_installed(&self.text_model).await?;
        self.client.load_model(&self.text_model).await?;
        info!(model = %self.text_model, "text model loaded");
        Ok(Box::new(OllamaTextBackend {
            client: self.client.clone(),
            model: self.text_model.clone(),
            params: self.text_params,
            released: AtomicBool::new(false),
        }))
    }

    fn build_multimodal_options(&self) -> Result<MultimodalOptions, EdgeRagError> {
        Ok(MultimodalOptions {
            model: self.vision_model.clone(),
            max_tokens: self.vision_max_tokens,
            max_images: self.max_images,
        })
    }

    async fn create_multimodal_backend(
        &self,
        options: &MultimodalOptions,
    ) -> Result<Box<dyn MultimodalBackend>, EdgeRagError> {
        self.client.load_model(&options.model).await?;
        info!(model = %options.model, "vision model loaded");
        Ok(Box::new(OllamaMultimodalBackend {
            client: self.client.clone(),
            model: options.model.clone(),
            max_images: options.max_images,
            closed: AtomicBool::new(false),
        }))
    }

    fn build_session_options(
        &self,
        options: &MultimodalOptions,
    ) -> Result<SessionOptions, EdgeRagError> {
        Ok(SessionOptions {
            enable_vision: true,
            params: GenerationParams {
                max_tokens: options.max_tokens,
                temperature: self.text_params.temperature,
                top_p: self.text_params.top_p,
                top_k: self.vision_top_k,
            },
        })
    }
}

/// The persistent text backend.
pub struct OllamaTextBackend {
    client: OllamaClient,
    model: String,
    params: GenerationParams,
    released: AtomicBool,
}

#[async_trait]
impl PluginAdapter for OllamaTextBackend {
    fn name(&self) -> &str {
        &self.model
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, EdgeRagError> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("model released".to_string()));
        }
        match self.client.list_models().await {
            Ok(models) if models.iter().any(|m| *m == self.model) => Ok(HealthStatus::Healthy),
            Ok(_) => Ok(HealthStatus::Degraded(format!("model '{}' missing", self.model))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), EdgeRagError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.unload_model(&self.model).await
    }
}

#[async_trait]
impl InferenceBackend for OllamaTextBackend {
    async fn generate(&self, prompt: &str) -> Result<IncrementStream, EdgeRagError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(EdgeRagError::BackendUnavailable);
        }
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: Some(prompt.to_string()),
            options: Some(model_options(&self.params)),
            ..GenerateRequest::default()
        };
        let chunks = self.client.generate_stream(&request).await?;
        Ok(delta_increments(chunks))
    }
}

/// A transient vision-capable backend.
pub struct OllamaMultimodalBackend {
    client: OllamaClient,
    model: String,
    max_images: u32,
    closed: AtomicBool,
}

#[async_trait]
impl MultimodalBackend for OllamaMultimodalBackend {
    async fn create_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn MultimodalSession>, EdgeRagError> {
        if !options.enable_vision {
            return Err(EdgeRagError::backend("session options do not enable vision"));
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(EdgeRagError::BackendUnavailable);
        }
        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            model: self.model.clone(),
            params: options.params,
            max_images: self.max_images,
            images: Vec::new(),
            prompt: String::new(),
        }))
    }

    async fn close(&self) -> Result<(), EdgeRagError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.client.unload_model(&self.model).await
    }
}

/// One image question. Images must be added before any text.
pub struct OllamaSession {
    client: OllamaClient,
    model: String,
    params: GenerationParams,
    max_images: u32,
    images: Vec<String>,
    prompt: String,
}

#[async_trait]
impl MultimodalSession for OllamaSession {
    async fn add_image(&mut self, image: &RawImage) -> Result<(), EdgeRagError> {
        if !self.prompt.is_empty() {
            return Err(EdgeRagError::backend("images must be added before text"));
        }
        if image.is_empty() {
            return Err(EdgeRagError::backend("image is empty"));
        }
        if self.images.len() >= self.max_images as usize {
            return Err(EdgeRagError::backend(format!(
                "session accepts at most {} image(s)",
                self.max_images
            )));
        }
        self.images.push(STANDARD.encode(&image.bytes));
        debug!(bytes = image.bytes.len(), mime = %image.mime, "image attached");
        Ok(())
    }

    async fn add_query_chunk(&mut self, text: &str) -> Result<(), EdgeRagError> {
        self.prompt.push_str(text);
        Ok(())
    }

    async fn generate(&mut self) -> Result<IncrementStream, EdgeRagError> {
        if self.images.is_empty() {
            warn!("multimodal generation without an image");
        }
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: Some(self.prompt.clone()),
            images: self.images.clone(),
            options: Some(model_options(&self.params)),
            ..GenerateRequest::default()
        };
        let chunks = self.client.generate_stream(&request).await?;
        Ok(cumulative_increments(chunks))
    }

    async fn close(&mut self) -> Result<(), EdgeRagError> {
        self.images.clear();
        self.prompt.clear();
        Ok(())
    }
}
