// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::EdgeRagError;
use crate::traits::adapter::PluginAdapter;

/// Adapter for turning text into fixed-dimension vectors.
///
/// Every vector returned by an implementation has exactly
/// [`dimensions`](EmbeddingAdapter::dimensions) components.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Output dimension D.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EdgeRagError>;

    /// Embeds a batch of texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EdgeRagError>;
}
