// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for edgerag integration tests.
//!
//! Provides mock models and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without model files.
//!
//! # Components
//!
//! - [`MockEmbedder`] - bag-of-words embedder with stable vectors
//! - [`MockBackendFactory`] - scripted text and multimodal backends with fault injection
//! - [`CollectingSink`] - records streamed output
//! - [`TestHarness`] - memory plus inference manager, wired together

pub mod harness;
pub mod mock_backend;
pub mod mock_embedder;
pub mod sink;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_backend::{BackendEvent, Convention, FaultKind, MockBackendFactory};
pub use mock_embedder::MockEmbedder;
pub use sink::CollectingSink;
