// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline tests.
//!
//! `TestHarness` assembles semantic memory over a [`MockEmbedder`] and an
//! [`InferenceManager`] over a [`MockBackendFactory`], so the full
//! retrieve-render-generate path runs without model files.

use std::sync::Arc;

use edgerag_config::EdgeRagConfig;
use edgerag_core::EdgeRagError;
use edgerag_core::types::RawImage;
use edgerag_inference::{InferenceManager, ManagerSettings, NullSink};
use edgerag_memory::{SemanticMemory, split_chunks};
use tokio::sync::RwLock;
use tracing::debug;

use crate::mock_backend::MockBackendFactory;
use crate::mock_embedder::{DEFAULT_DIMS, MockEmbedder};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    chunks: Vec<String>,
    config: EdgeRagConfig,
    factory: MockBackendFactory,
    initialize: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            chunks: Vec::new(),
            config: EdgeRagConfig::default(),
            factory: MockBackendFactory::new(),
            initialize: true,
        }
    }

    /// Splits `corpus` on the configured chunk separator and records it.
    pub fn with_corpus(mut self, corpus: &str) -> Self {
        let marker = self.config.memory.chunk_separator.clone();
        self.chunks.extend(split_chunks(corpus, &marker));
        self
    }

    pub fn with_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chunks.extend(chunks.into_iter().map(Into::into));
        self
    }

    pub fn with_factory(mut self, factory: MockBackendFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Adjusts the configuration before anything is built.
    pub fn with_config(mut self, edit: impl FnOnce(&mut EdgeRagConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Leaves the backend unloaded until the first request.
    pub fn lazy(mut self) -> Self {
        self.initialize = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, EdgeRagError> {
        let embedder = Arc::new(MockEmbedder::new(DEFAULT_DIMS));
        let mut memory = SemanticMemory::new(embedder.clone());
        memory.record(&self.chunks).await?;
        let memory = Arc::new(RwLock::new(memory));

        let settings = ManagerSettings::from_config(&self.config)?;
        let manager = Arc::new(InferenceManager::new(
            Arc::new(self.factory.clone()),
            Arc::clone(&memory),
            settings,
        ));
        if self.initialize
            && let Err(e) = manager.initialize().await
        {
            debug!(error = %e, "harness backend failed to initialize");
        }

        Ok(TestHarness {
            manager,
            memory,
            embedder,
            factory: self.factory,
            config: self.config,
        })
    }
}

/// A fully wired pipeline over mock models.
pub struct TestHarness {
    pub manager: Arc<InferenceManager>,
    pub memory: Arc<RwLock<SemanticMemory>>,
    pub embedder: Arc<MockEmbedder>,
    pub factory: MockBackendFactory,
    pub config: EdgeRagConfig,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn ask(&self, query: &str) -> String {
        self.manager.generate(query, &NullSink).await
    }

    pub async fn ask_with_image(&self, query: &str, image: &RawImage) -> String {
        self.manager.generate_with_image(query, image, &NullSink).await
    }

    pub async fn translate(&self, text: &str, language: &str) -> String {
        self.manager.translate(text, language, &NullSink).await
    }

    /// A small non-empty image.
    pub fn sample_image() -> RawImage {
        RawImage::new(vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a], "image/png")
    }
}
