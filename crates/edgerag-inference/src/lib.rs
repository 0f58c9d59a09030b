// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented inference for edgerag.
//!
//! - **PromptTemplate**: `{context}` / `{query}` rendering
//! - **ResponseAccumulator**: folds cumulative and delta increments into one
//!   monotonically growing text
//! - **RetrievalInferenceChain**: retrieve, render, generate
//! - **InferenceManager**: backend lifecycle, request serialization, and the
//!   image upgrade with text-only fallback

pub mod accumulator;
pub mod chain;
pub mod manager;
pub mod prompt;

pub use accumulator::{Completion, NullSink, ResponseAccumulator, StreamSink};
pub use chain::RetrievalInferenceChain;
pub use manager::{InferenceManager, ManagerSettings, ManagerStatus};
pub use prompt::{PromptTemplate, render_translation};
