// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic bag-of-words embedder.
//!
//! Each lowercase alphanumeric word is hashed (FNV-1a) into one of `dims`
//! buckets and the counts are L2-normalized, so texts sharing words score
//! high under cosine similarity. No model files are needed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use edgerag_core::traits::{EmbeddingAdapter, PluginAdapter};
use edgerag_core::types::{AdapterType, HealthStatus};
use edgerag_core::EdgeRagError;

pub const DEFAULT_DIMS: usize = 64;

pub struct MockEmbedder {
    dims: usize,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of texts embedded so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector for `text`, without touching the call counter.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dims;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, EdgeRagError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EdgeRagError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EdgeRagError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EdgeRagError::Embedding("mock embedder failure".into()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EdgeRagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
