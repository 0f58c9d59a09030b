// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the edgerag pipeline.

use thiserror::Error;

use crate::types::MultimodalStage;

/// The primary error type used across all edgerag adapter traits and core operations.
///
/// An empty retrieval result is not an error and has no variant here.
#[derive(Debug, Error)]
pub enum EdgeRagError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors (vector store snapshot, SQLite failures).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model (embedding or language) failed to load.
    ///
    /// Terminal for the owning component until it is explicitly reinitialized.
    #[error("{component} failed to initialize: {message}")]
    Initialization { component: String, message: String },

    /// The device could not allocate memory for a model.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Embedding inference failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// The persistent backend has been released and must be reloaded.
    #[error("inference backend is not loaded")]
    BackendUnavailable,

    /// Language model backend errors (load failure, generation failure, transport).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A step of the multimodal construction or generation failed.
    #[error("multimodal {stage} failed: {message}")]
    Multimodal {
        stage: MultimodalStage,
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// The request was cancelled by its caller.
    #[error("request cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EdgeRagError {
    /// Shorthand for a backend error without an underlying source.
    pub fn backend(message: impl Into<String>) -> Self {
        EdgeRagError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true if this error reports memory exhaustion.
    pub fn is_out_of_memory(&self) -> bool {
        matches!(self, EdgeRagError::OutOfMemory(_))
    }
}
