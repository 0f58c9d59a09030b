// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory domain types.

use edgerag_core::TaskType;
use serde::{Deserialize, Serialize};

/// One chunk of ingested text together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryChunk {
    /// Unique identifier for this chunk.
    pub id: String,
    /// The text content.
    pub text: String,
    /// L2-normalized embedding, `D` components.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl MemoryChunk {
    pub fn new(text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            embedding,
        }
    }
}

/// A nearest-neighbour query against semantic memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub task: TaskType,
    pub top_k: usize,
    pub min_score: f32,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, top_k: usize, min_score: f32) -> Self {
        Self {
            query: query.into(),
            task: TaskType::QuestionAnswering,
            top_k,
            min_score,
        }
    }

    pub fn with_task(mut self, task: TaskType) -> Self {
        self.task = task;
        self
    }
}

/// A chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: MemoryChunk,
    pub score: f32,
}

/// Retrieved chunks, ordered by descending score.
///
/// An empty result means nothing cleared the threshold. It is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Chunk texts in rank order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.chunk.text.as_str())
    }
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector. Trailing partial floats are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude, so a zero embedding
/// never outranks a real match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > f32::EPSILON { dot / denom } else { 0.0 }
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

/// True if every component is exactly zero.
pub fn is_zero_vector(vec: &[f32]) -> bool {
    vec.iter().all(|&v| v == 0.0)
}
