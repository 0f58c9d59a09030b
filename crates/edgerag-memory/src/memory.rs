// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory: an embedder plus the vector store it exclusively owns.

use std::path::Path;
use std::sync::Arc;

use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::EmbeddingAdapter;
use tracing::{debug, info};

use crate::store::VectorStore;
use crate::types::{MemoryChunk, RetrievalRequest, RetrievalResult};

/// Records text chunks and retrieves the ones closest to a query.
pub struct SemanticMemory {
    embedder: Arc<dyn EmbeddingAdapter>,
    store: VectorStore,
}

impl SemanticMemory {
    /// Creates an empty memory whose dimension follows the embedder.
    pub fn new(embedder: Arc<dyn EmbeddingAdapter>) -> Self {
        let store = VectorStore::new(embedder.dimensions());
        Self { embedder, store }
    }

    /// Wraps an existing store, typically one loaded from a snapshot.
    pub fn with_store(
        embedder: Arc<dyn EmbeddingAdapter>,
        store: VectorStore,
    ) -> Result<Self, EdgeRagError> {
        if store.dimensions() != embedder.dimensions() {
            return Err(EdgeRagError::Config(format!(
                "store holds {}-dimension vectors but the embedder produces {}",
                store.dimensions(),
                embedder.dimensions()
            )));
        }
        Ok(Self { embedder, store })
    }

    /// Opens the snapshot at `path` if present, otherwise starts empty.
    pub async fn open(
        embedder: Arc<dyn EmbeddingAdapter>,
        path: &Path,
    ) -> Result<Self, EdgeRagError> {
        if !path.exists() {
            return Ok(Self::new(embedder));
        }
        let store = VectorStore::load(path, embedder.dimensions()).await?;
        Self::with_store(embedder, store)
    }

    pub async fn save(&self, path: &Path) -> Result<(), EdgeRagError> {
        self.store.save(path).await
    }

    /// Embeds and appends `chunks`, returning how many were stored.
    ///
    /// Blank chunks are skipped. If embedding fails nothing is appended.
    pub async fn record(&mut self, chunks: &[String]) -> Result<usize, EdgeRagError> {
        let texts: Vec<String> = chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if texts.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(EdgeRagError::Embedding(format!(
                "embedded {} of {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        let records: Vec<MemoryChunk> = texts
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| MemoryChunk::new(text, embedding))
            .collect();
        let n = records.len();
        self.store.insert_all(records)?;

        info!(chunks = n, total = self.store.len(), "recorded chunks");
        Ok(n)
    }

    /// Nearest chunks to the request's query.
    ///
    /// `top_k = 0` or an empty store returns an empty result without
    /// embedding the query.
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
    ) -> Result<RetrievalResult, EdgeRagError> {
        if request.top_k == 0 || self.store.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let query = self.embedder.embed(&request.query).await?;
        let chunks = self
            .store
            .search(&query, request.top_k, request.min_score);

        debug!(
            task = %request.task,
            k = request.top_k,
            hits = chunks.len(),
            best = ?chunks.first().map(|c| c.score),
            "retrieved context"
        );
        Ok(RetrievalResult { chunks })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.store.dimensions()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingAdapter> {
        &self.embedder
    }
}
