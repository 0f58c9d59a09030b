// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted backend factory for deterministic tests.
//!
//! `MockBackendFactory` hands out text and multimodal backends that replay
//! queued responses word by word, records every lifecycle event, tracks how
//! many models are resident at once, and can inject a fault at any step of
//! the multimodal path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edgerag_core::traits::{
    BackendFactory, InferenceBackend, MultimodalBackend, MultimodalSession, PluginAdapter,
};
use edgerag_core::types::{
    AdapterType, GenerationParams, HealthStatus, IncrementStream, MultimodalOptions,
    MultimodalStage, RawImage, SessionOptions, StreamingIncrement,
};
use edgerag_core::EdgeRagError;
use futures::StreamExt;

pub const DEFAULT_RESPONSE: &str = "mock response";

/// Which streaming convention a mock backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    Cumulative,
    Delta,
}

/// How an injected fault manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Error,
    OutOfMemory,
    /// Never completes; exercises construction timeouts.
    Hang,
    /// At `Generation`: the stream yields the first half of the response,
    /// then an error. Ignored at other stages.
    MidStream,
}

/// Everything the mock backends did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    TextLoaded,
    TextReleased,
    Generate(String),
    MultimodalCreated,
    SessionCreated,
    ImageAdded,
    QueryAdded(String),
    MultimodalGenerate,
    SessionClosed,
    MultimodalClosed,
}

struct Script {
    text_responses: Mutex<VecDeque<String>>,
    image_responses: Mutex<VecDeque<String>>,
    text_convention: Mutex<Convention>,
    image_convention: Mutex<Convention>,
    fault: Mutex<Option<(MultimodalStage, FaultKind)>>,
    load_failures: AtomicUsize,
    fail_generation: AtomicBool,
    text_stream_break: Mutex<Option<usize>>,
    chunk_delay: Mutex<Option<Duration>>,
    events: Mutex<Vec<BackendEvent>>,
    resident: AtomicUsize,
    max_resident: AtomicUsize,
}

impl Script {
    fn record(&self, event: BackendEvent) {
        lock(&self.events).push(event);
    }

    fn fault_at(&self, stage: MultimodalStage) -> Option<FaultKind> {
        match *lock(&self.fault) {
            Some((s, kind)) if s == stage => Some(kind),
            _ => None,
        }
    }

    async fn check(&self, stage: MultimodalStage) -> Result<(), EdgeRagError> {
        match self.fault_at(stage) {
            None | Some(FaultKind::MidStream) => Ok(()),
            Some(FaultKind::Error) => Err(EdgeRagError::backend(format!("injected {stage} fault"))),
            Some(FaultKind::OutOfMemory) => Err(EdgeRagError::OutOfMemory(format!(
                "injected {stage} allocation failure"
            ))),
            Some(FaultKind::Hang) => futures::future::pending().await,
        }
    }

    /// Synchronous steps cannot hang; a `Hang` fault there is reported as an error.
    fn check_now(&self, stage: MultimodalStage) -> Result<(), EdgeRagError> {
        match self.fault_at(stage) {
            None | Some(FaultKind::MidStream) => Ok(()),
            Some(FaultKind::OutOfMemory) => Err(EdgeRagError::OutOfMemory(format!(
                "injected {stage} allocation failure"
            ))),
            Some(_) => Err(EdgeRagError::backend(format!("injected {stage} fault"))),
        }
    }

    fn acquire_model(&self) {
        let now = self.resident.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_resident.fetch_max(now, Ordering::SeqCst);
    }

    fn release_model(&self) {
        self.resident.fetch_sub(1, Ordering::SeqCst);
    }

    /// Splits `text` at spaces. With `break_after`, only that many
    /// increments are sent before the stream fails.
    fn stream(
        &self,
        text: String,
        convention: Convention,
        break_after: Option<usize>,
    ) -> IncrementStream {
        let mut so_far = String::new();
        let mut increments: Vec<Result<StreamingIncrement, EdgeRagError>> = text
            .split_inclusive(' ')
            .map(|piece| match convention {
                Convention::Delta => StreamingIncrement::Delta(piece.to_string()),
                Convention::Cumulative => {
                    so_far.push_str(piece);
                    StreamingIncrement::Cumulative(so_far.clone())
                }
            })
            .map(Ok)
            .collect();
        if let Some(n) = break_after {
            increments.truncate(n);
            increments.push(Err(EdgeRagError::backend("mock stream broke off")));
        }

        match *lock(&self.chunk_delay) {
            None => Box::pin(futures::stream::iter(increments)),
            Some(delay) => Box::pin(futures::stream::iter(increments).then(move |inc| async move {
                tokio::time::sleep(delay).await;
                inc
            })),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cloneable handle; clones share one script and event log.
#[derive(Clone)]
pub struct MockBackendFactory {
    script: Arc<Script>,
}

impl Default for MockBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackendFactory {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script {
                text_responses: Mutex::new(VecDeque::new()),
                image_responses: Mutex::new(VecDeque::new()),
                text_convention: Mutex::new(Convention::Delta),
                image_convention: Mutex::new(Convention::Cumulative),
                fault: Mutex::new(None),
                load_failures: AtomicUsize::new(0),
                fail_generation: AtomicBool::new(false),
                text_stream_break: Mutex::new(None),
                chunk_delay: Mutex::new(None),
                events: Mutex::new(Vec::new()),
                resident: AtomicUsize::new(0),
                max_resident: AtomicUsize::new(0),
            }),
        }
    }

    /// Queues responses for the text backend.
    pub fn with_text_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script.text_responses).extend(responses.into_iter().map(Into::into));
        self
    }

    /// Queues responses for multimodal sessions.
    pub fn with_image_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script.image_responses).extend(responses.into_iter().map(Into::into));
        self
    }

    pub fn with_conventions(self, text: Convention, image: Convention) -> Self {
        *lock(&self.script.text_convention) = text;
        *lock(&self.script.image_convention) = image;
        self
    }

    /// Injects a fault at one multimodal step.
    pub fn with_fault(self, stage: MultimodalStage, kind: FaultKind) -> Self {
        self.set_fault(Some((stage, kind)));
        self
    }

    /// The next `n` text backend loads fail.
    pub fn with_load_failures(self, n: usize) -> Self {
        self.script.load_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Text responses stop with an error after `n` increments.
    pub fn with_text_stream_break(self, n: usize) -> Self {
        *lock(&self.script.text_stream_break) = Some(n);
        self
    }

    /// Sleeps before every streamed increment.
    pub fn with_chunk_delay(self, delay: Duration) -> Self {
        *lock(&self.script.chunk_delay) = Some(delay);
        self
    }

    pub fn set_fault(&self, fault: Option<(MultimodalStage, FaultKind)>) {
        *lock(&self.script.fault) = fault;
    }

    pub fn set_load_failures(&self, n: usize) {
        self.script.load_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_generation(&self, fail: bool) {
        self.script.fail_generation.store(fail, Ordering::SeqCst);
    }

    pub fn push_text_response(&self, response: impl Into<String>) {
        lock(&self.script.text_responses).push_back(response.into());
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        lock(&self.script.events).clone()
    }

    /// Prompts sent to the text backend, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                BackendEvent::Generate(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &BackendEvent) -> usize {
        lock(&self.script.events).iter().filter(|e| *e == event).count()
    }

    /// Models currently loaded.
    pub fn resident(&self) -> usize {
        self.script.resident.load(Ordering::SeqCst)
    }

    /// Highest number of models ever loaded at the same time.
    pub fn max_resident(&self) -> usize {
        self.script.max_resident.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for MockBackendFactory {
    async fn load_text_backend(&self) -> Result<Box<dyn InferenceBackend>, EdgeRagError> {
        let remaining = self.script.load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script.load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(EdgeRagError::backend("mock model file is corrupt"));
        }
        self.script.acquire_model();
        self.script.record(BackendEvent::TextLoaded);
        Ok(Box::new(MockTextBackend {
            script: Arc::clone(&self.script),
            released: AtomicBool::new(false),
        }))
    }

    fn build_multimodal_options(&self) -> Result<MultimodalOptions, EdgeRagError> {
        self.script.check_now(MultimodalStage::OptionsBuild)?;
        Ok(MultimodalOptions {
            model: "mock-vision".to_string(),
            max_tokens: 512,
            max_images: 1,
        })
    }

    async fn create_multimodal_backend(
        &self,
        _options: &MultimodalOptions,
    ) -> Result<Box<dyn MultimodalBackend>, EdgeRagError> {
        self.script.check(MultimodalStage::BackendCreation).await?;
        self.script.acquire_model();
        self.script.record(BackendEvent::MultimodalCreated);
        Ok(Box::new(MockMultimodalBackend {
            script: Arc::clone(&self.script),
            closed: AtomicBool::new(false),
        }))
    }

    fn build_session_options(
        &self,
        options: &MultimodalOptions,
    ) -> Result<SessionOptions, EdgeRagError> {
        self.script.check_now(MultimodalStage::SessionOptionsBuild)?;
        Ok(SessionOptions {
            enable_vision: true,
            params: GenerationParams {
                max_tokens: options.max_tokens,
                temperature: 1.0,
                top_p: 0.95,
                top_k: 32,
            },
        })
    }
}

pub struct MockTextBackend {
    script: Arc<Script>,
    released: AtomicBool,
}

#[async_trait]
impl PluginAdapter for MockTextBackend {
    fn name(&self) -> &str {
        "mock-text"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Backend
    }

    async fn health_check(&self) -> Result<HealthStatus, EdgeRagError> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("released".to_string()));
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EdgeRagError> {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.script.release_model();
            self.script.record(BackendEvent::TextReleased);
        }
        Ok(())
    }
}

#[async_trait]
impl InferenceBackend for MockTextBackend {
    async fn generate(&self, prompt: &str) -> Result<IncrementStream, EdgeRagError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(EdgeRagError::BackendUnavailable);
        }
        self.script.record(BackendEvent::Generate(prompt.to_string()));
        if self.script.fail_generation.load(Ordering::SeqCst) {
            return Err(EdgeRagError::backend("mock decoder crashed"));
        }
        let text = lock(&self.script.text_responses)
            .pop_front()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string());
        let convention = *lock(&self.script.text_convention);
        let break_after = *lock(&self.script.text_stream_break);
        Ok(self.script.stream(text, convention, break_after))
    }
}

pub struct MockMultimodalBackend {
    script: Arc<Script>,
    closed: AtomicBool,
}

#[async_trait]
impl MultimodalBackend for MockMultimodalBackend {
    async fn create_session(
        &self,
        _options: &SessionOptions,
    ) -> Result<Box<dyn MultimodalSession>, EdgeRagError> {
        self.script.check(MultimodalStage::SessionCreation).await?;
        self.script.record(BackendEvent::SessionCreated);
        Ok(Box::new(MockSession {
            script: Arc::clone(&self.script),
            has_image: false,
            query: String::new(),
            closed: false,
        }))
    }

    async fn close(&self) -> Result<(), EdgeRagError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.script.release_model();
            self.script.record(BackendEvent::MultimodalClosed);
        }
        Ok(())
    }
}

pub struct MockSession {
    script: Arc<Script>,
    has_image: bool,
    query: String,
    closed: bool,
}

#[async_trait]
impl MultimodalSession for MockSession {
    async fn add_image(&mut self, image: &RawImage) -> Result<(), EdgeRagError> {
        self.script.check(MultimodalStage::Input).await?;
        if !self.query.is_empty() {
            return Err(EdgeRagError::backend("image added after text"));
        }
        if image.is_empty() {
            return Err(EdgeRagError::backend("image has no pixels"));
        }
        self.has_image = true;
        self.script.record(BackendEvent::ImageAdded);
        Ok(())
    }

    async fn add_query_chunk(&mut self, text: &str) -> Result<(), EdgeRagError> {
        self.query.push_str(text);
        self.script.record(BackendEvent::QueryAdded(text.to_string()));
        Ok(())
    }

    async fn generate(&mut self) -> Result<IncrementStream, EdgeRagError> {
        self.script.check(MultimodalStage::Generation).await?;
        if !self.has_image {
            return Err(EdgeRagError::backend("no image in session"));
        }
        self.script.record(BackendEvent::MultimodalGenerate);
        let text = lock(&self.script.image_responses)
            .pop_front()
            .unwrap_or_else(|| DEFAULT_RESPONSE.to_string());
        let convention = *lock(&self.script.image_convention);
        let break_after = (self.script.fault_at(MultimodalStage::Generation)
            == Some(FaultKind::MidStream))
        .then(|| text.split_inclusive(' ').count() / 2);
        Ok(self.script.stream(text, convention, break_after))
    }

    async fn close(&mut self) -> Result<(), EdgeRagError> {
        if !self.closed {
            self.closed = true;
            self.script.record(BackendEvent::SessionClosed);
        }
        Ok(())
    }
}
