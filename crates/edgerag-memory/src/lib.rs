// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic memory for the edgerag pipeline.
//!
//! Turns raw text into a queryable memory on device: WordPiece tokenization,
//! ONNX sentence embeddings, and an exhaustive cosine-similarity store with
//! optional SQLite snapshots.
//!
//! ## Architecture
//!
//! - **TextTokenizer**: fixed-length `[CLS] ... [SEP]` sequences with clamped ids
//! - **OnnxEmbedder**: ONNX Runtime inference, output tensor resolved at load
//! - **VectorStore**: ordered `(text, vector)` records, stable top-k search
//! - **SemanticMemory**: `record` / `retrieve` over an embedder and its store
//! - **ModelManager**: model and vocabulary path checks
//! - **split_chunks**: corpus splitting for ingestion

pub mod embedder;
pub mod ingest;
pub mod memory;
pub mod model_manager;
pub mod store;
pub mod tokenizer;
pub mod types;

pub use embedder::{OnnxEmbedder, OutputSelection};
pub use ingest::split_chunks;
pub use memory::SemanticMemory;
pub use model_manager::ModelManager;
pub use store::VectorStore;
pub use tokenizer::{SequenceLayout, TextTokenizer, TokenSequence};
pub use types::*;
