// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Language model backend traits.
//!
//! A [`BackendFactory`] builds the one persistent text backend and, on
//! demand, a transient multimodal backend. Construction of the multimodal
//! path is split into the same four steps the inference manager guards
//! individually: options, backend, session options, session.

use async_trait::async_trait;

use crate::error::EdgeRagError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{IncrementStream, MultimodalOptions, RawImage, SessionOptions};

/// A loaded text-generation backend.
///
/// [`PluginAdapter::shutdown`] releases the model's memory.
#[async_trait]
pub trait InferenceBackend: PluginAdapter {
    /// Starts generating a response for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<IncrementStream, EdgeRagError>;
}

/// A single-use conversation on a multimodal backend.
#[async_trait]
pub trait MultimodalSession: Send {
    /// Adds an image to the pending query. Images must precede text.
    async fn add_image(&mut self, image: &RawImage) -> Result<(), EdgeRagError>;

    /// Appends text to the pending query.
    async fn add_query_chunk(&mut self, text: &str) -> Result<(), EdgeRagError>;

    /// Generates a response for everything added so far.
    async fn generate(&mut self) -> Result<IncrementStream, EdgeRagError>;

    /// Releases the session.
    async fn close(&mut self) -> Result<(), EdgeRagError>;
}

/// A transient backend able to accept image input.
#[async_trait]
pub trait MultimodalBackend: Send + Sync {
    /// Opens a session with the given options.
    async fn create_session(
        &self,
        options: &SessionOptions,
    ) -> Result<Box<dyn MultimodalSession>, EdgeRagError>;

    /// Releases the backend's model memory.
    async fn close(&self) -> Result<(), EdgeRagError>;
}

/// Builds backends. Owned by the inference manager.
#[async_trait]
pub trait BackendFactory: Send + Sync + 'static {
    /// Loads the persistent text backend.
    async fn load_text_backend(&self) -> Result<Box<dyn InferenceBackend>, EdgeRagError>;

    /// Builds the options for a multimodal backend.
    fn build_multimodal_options(&self) -> Result<MultimodalOptions, EdgeRagError>;

    /// Loads a multimodal backend. May fail with [`EdgeRagError::OutOfMemory`].
    async fn create_multimodal_backend(
        &self,
        options: &MultimodalOptions,
    ) -> Result<Box<dyn MultimodalBackend>, EdgeRagError>;

    /// Builds vision-enabled session options for a multimodal backend.
    fn build_session_options(
        &self,
        options: &MultimodalOptions,
    ) -> Result<SessionOptions, EdgeRagError>;
}
