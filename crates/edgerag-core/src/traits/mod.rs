// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod backend;
pub mod embedding;

pub use adapter::PluginAdapter;
pub use backend::{BackendFactory, InferenceBackend, MultimodalBackend, MultimodalSession};
pub use embedding::EmbeddingAdapter;
