// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the memory, inference, and backend crates.

use std::pin::Pin;

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::EdgeRagError;

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Embedding,
    Backend,
}

/// What a retrieval request is used for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    QuestionAnswering,
    Translation,
    Retrieval,
}

/// Lifecycle state of the persistent language model backend.
///
/// `Uninitialized -> Initializing -> Ready | Failed`, with `Ready <-> Busy`
/// around every generation. `Failed` only leaves through an explicit reinitialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Ready,
    Failed(String),
    Busy,
}

impl BackendState {
    /// Returns true for the `Failed` state.
    pub fn is_failed(&self) -> bool {
        matches!(self, BackendState::Failed(_))
    }
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendState::Uninitialized => write!(f, "uninitialized"),
            BackendState::Initializing => write!(f, "initializing"),
            BackendState::Ready => write!(f, "ready"),
            BackendState::Failed(reason) => write!(f, "failed: {reason}"),
            BackendState::Busy => write!(f, "busy"),
        }
    }
}

/// One streamed piece of generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingIncrement {
    /// The full text generated so far.
    Cumulative(String),
    /// Text to append to what was generated so far.
    Delta(String),
}

impl StreamingIncrement {
    /// The text carried by this increment, regardless of convention.
    pub fn text(&self) -> &str {
        match self {
            StreamingIncrement::Cumulative(t) | StreamingIncrement::Delta(t) => t,
        }
    }
}

/// Stream of increments produced by a backend generation call.
pub type IncrementStream =
    Pin<Box<dyn Stream<Item = Result<StreamingIncrement, EdgeRagError>> + Send>>;

/// An encoded image (PNG, JPEG, ...) handed over by the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// How a request should be generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationMode {
    TextOnly,
    Multimodal(RawImage),
}

/// Sampling parameters for a generation session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 1.0,
            top_p: 0.95,
            top_k: 64,
        }
    }
}

/// Options for constructing a transient multimodal backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MultimodalOptions {
    pub model: String,
    pub max_tokens: u32,
    pub max_images: u32,
}

/// Options for a session on a multimodal backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub enable_vision: bool,
    pub params: GenerationParams,
}

/// Steps of the multimodal path, used to report where it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MultimodalStage {
    OptionsBuild,
    BackendCreation,
    SessionOptionsBuild,
    SessionCreation,
    Input,
    Generation,
}
