// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the edgerag pipeline.
//!
//! This crate provides the error type, shared domain types, and the adapter
//! traits implemented by embedding models and language model backends.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EdgeRagError;
pub use types::{
    AdapterType, BackendState, GenerationMode, HealthStatus, IncrementStream, RawImage,
    StreamingIncrement, TaskType,
};

pub use traits::{
    BackendFactory, EmbeddingAdapter, InferenceBackend, MultimodalBackend, MultimodalSession,
    PluginAdapter,
};
