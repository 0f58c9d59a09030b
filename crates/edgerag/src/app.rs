// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level application context.
//!
//! [`App`] owns the semantic memory and the inference manager and is passed
//! by reference to whatever drives it (the CLI commands, the shell, tests).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use edgerag_config::EdgeRagConfig;
use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::{BackendFactory, EmbeddingAdapter};
use edgerag_core::types::{GenerationMode, RawImage};
use edgerag_inference::{InferenceManager, ManagerSettings, ManagerStatus, StreamSink};
use edgerag_memory::{ModelManager, OnnxEmbedder, SemanticMemory, split_chunks};
use edgerag_ollama::OllamaBackendFactory;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of one ingestion.
#[derive(Debug)]
pub struct IngestReport {
    /// Chunks appended to the in-memory store.
    pub recorded: usize,
    /// Set when the store snapshot could not be written. The appended chunks
    /// stay searchable until the process exits.
    pub snapshot_error: Option<EdgeRagError>,
}

pub struct App {
    config: EdgeRagConfig,
    memory: Arc<RwLock<SemanticMemory>>,
    manager: Arc<InferenceManager>,
    store_path: Option<PathBuf>,
}

impl App {
    /// Loads the embedding model from disk and connects the Ollama backend.
    ///
    /// The language model itself is loaded by [`start`](Self::start) or by
    /// the first request.
    pub async fn open(config: EdgeRagConfig) -> Result<Self, EdgeRagError> {
        let files = ModelManager::from_config(&config);
        files.ensure_available()?;
        files.prepare_store_dir().await?;

        let model = files.model_path().to_path_buf();
        let vocab = files.vocab_path().to_path_buf();
        let embedding = config.embedding.clone();
        let embedder =
            tokio::task::spawn_blocking(move || OnnxEmbedder::load(&model, &vocab, &embedding))
                .await
                .map_err(|e| EdgeRagError::Internal(format!("embedding model loader panicked: {e}")))??;

        let factory = OllamaBackendFactory::from_config(&config)?;
        let store_path = files.store_path().map(Path::to_path_buf);
        Self::assemble(config, Arc::new(embedder), Arc::new(factory), store_path).await
    }

    /// Wires an application from already constructed adapters.
    pub async fn assemble(
        config: EdgeRagConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
        factory: Arc<dyn BackendFactory>,
        store_path: Option<PathBuf>,
    ) -> Result<Self, EdgeRagError> {
        let memory = match store_path.as_deref() {
            Some(path) => SemanticMemory::open(embedder, path).await?,
            None => SemanticMemory::new(embedder),
        };
        info!(chunks = memory.len(), dims = memory.dimensions(), "semantic memory ready");
        let memory = Arc::new(RwLock::new(memory));

        let settings = ManagerSettings::from_config(&config)?;
        let manager = Arc::new(InferenceManager::new(factory, Arc::clone(&memory), settings));

        Ok(Self {
            config,
            memory,
            manager,
            store_path,
        })
    }

    /// Loads the language model now instead of on the first request.
    pub async fn start(&self) -> Result<(), EdgeRagError> {
        self.manager.initialize().await
    }

    pub fn config(&self) -> &EdgeRagConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<InferenceManager> {
        &self.manager
    }

    pub fn memory(&self) -> &Arc<RwLock<SemanticMemory>> {
        &self.memory
    }

    pub fn status(&self) -> ManagerStatus {
        self.manager.status()
    }

    pub async fn chunk_count(&self) -> usize {
        self.memory.read().await.len()
    }

    /// Splits `corpus` at lines starting with `marker` and records the chunks.
    ///
    /// Fails only if recording fails, in which case nothing was appended. The
    /// store snapshot, when configured, is rewritten afterwards and a write
    /// failure is reported in [`IngestReport::snapshot_error`].
    pub async fn ingest(&self, corpus: &str, marker: &str) -> Result<IngestReport, EdgeRagError> {
        let chunks = split_chunks(corpus, marker);
        let mut memory = self.memory.write().await;
        let recorded = memory.record(&chunks).await?;

        let mut snapshot_error = None;
        if let Some(path) = &self.store_path {
            match memory.save(path).await {
                Ok(()) => {
                    info!(path = %path.display(), total = memory.len(), "store snapshot written")
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store snapshot not written");
                    snapshot_error = Some(e);
                }
            }
        }
        Ok(IngestReport {
            recorded,
            snapshot_error,
        })
    }

    /// Ingests using the configured chunk separator.
    pub async fn ingest_corpus(&self, corpus: &str) -> Result<IngestReport, EdgeRagError> {
        let marker = self.config.memory.chunk_separator.clone();
        self.ingest(corpus, &marker).await
    }

    pub async fn generate(
        &self,
        query: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        self.manager.generate_with_cancel(query, sink, cancel).await
    }

    pub async fn generate_with_image(
        &self,
        query: &str,
        image: &RawImage,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        self.manager
            .generate_with_image_cancel(query, image, sink, cancel)
            .await
    }

    pub async fn respond(
        &self,
        query: &str,
        mode: &GenerationMode,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        self.manager.respond(query, mode, sink, cancel).await
    }

    pub async fn translate(
        &self,
        text: &str,
        language: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        self.manager
            .translate_with_cancel(text, language, sink, cancel)
            .await
    }

    /// Frees the language model.
    pub async fn shutdown(&self) {
        self.manager.release().await;
    }
}

/// Reads an image file, guessing its MIME type from the extension.
pub async fn load_image(path: &Path) -> Result<RawImage, EdgeRagError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| EdgeRagError::Storage {
        source: Box::new(e),
    })?;
    if bytes.is_empty() {
        warn!(path = %path.display(), "image file is empty");
    }
    Ok(RawImage::new(bytes, mime_for(path)))
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}
