// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inference backend manager.
//!
//! Owns the single persistent text backend and serializes every generation
//! request behind one async mutex, so at most one model is ever resident.
//! Image requests temporarily swap the persistent backend for a transient
//! multimodal one and always restore it before the mutex is released. Their
//! answer reaches the sink in one piece once the vision stream has ended.
//!
//! States: `Uninitialized -> Initializing -> Ready | Failed`, `Ready <-> Busy`
//! around each request. A `Failed` backend rejects requests immediately until
//! [`InferenceManager::reinitialize`] succeeds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use edgerag_config::EdgeRagConfig;
use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::{BackendFactory, InferenceBackend, MultimodalBackend, MultimodalSession};
use edgerag_core::types::{BackendState, GenerationMode, MultimodalStage, RawImage};
use edgerag_memory::SemanticMemory;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::accumulator::{Completion, NullSink, ResponseAccumulator, StreamSink};
use crate::chain::RetrievalInferenceChain;
use crate::prompt::{PromptTemplate, render_translation};

/// Manager settings derived from [`EdgeRagConfig`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub rag_template: PromptTemplate,
    pub translation_template: String,
    pub image_preamble: String,
    pub top_k: usize,
    pub min_score: f32,
    pub multimodal_enabled: bool,
    pub construction_timeout: Duration,
}

impl ManagerSettings {
    pub fn from_config(config: &EdgeRagConfig) -> Result<Self, EdgeRagError> {
        Ok(Self {
            rag_template: PromptTemplate::new(config.prompt.rag_template.clone())?,
            translation_template: config.prompt.translation_template.clone(),
            image_preamble: config.prompt.image_preamble.clone(),
            top_k: config.memory.top_k,
            min_score: config.memory.score_threshold,
            multimodal_enabled: config.multimodal.enabled,
            construction_timeout: Duration::from_secs(config.multimodal.construction_timeout_secs),
        })
    }
}

/// Point-in-time view of the manager for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub state: BackendState,
    pub backend_loaded: bool,
    pub completed: u64,
    pub fallbacks: u64,
}

enum BackendSlot {
    /// Not loaded yet, or released; loaded on the next request.
    Empty,
    Loaded(Box<dyn InferenceBackend>),
    /// Load failed. Only `reinitialize` leaves this.
    Failed(String),
}

/// Marks the manager `Busy` for the lifetime of a request.
struct BusyGuard<'a> {
    state: &'a watch::Sender<BackendState>,
}

impl<'a> BusyGuard<'a> {
    fn enter(state: &'a watch::Sender<BackendState>) -> Self {
        state.send_replace(BackendState::Busy);
        Self { state }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_if_modified(|s| {
            if *s == BackendState::Busy {
                *s = BackendState::Ready;
                true
            } else {
                false
            }
        });
    }
}

/// Transient multimodal resources for one image request.
#[derive(Default)]
struct Transient {
    backend: Option<Box<dyn MultimodalBackend>>,
    session: Option<Box<dyn MultimodalSession>>,
}

impl Transient {
    /// Builds backend and session. Whatever was created before a failure
    /// (or before the caller's timeout drops this future) stays in `self`.
    async fn construct(&mut self, factory: &dyn BackendFactory) -> Result<(), EdgeRagError> {
        let options = factory
            .build_multimodal_options()
            .map_err(|e| stage_error(MultimodalStage::OptionsBuild, e))?;
        let backend = self.backend.insert(
            factory
                .create_multimodal_backend(&options)
                .await
                .map_err(|e| stage_error(MultimodalStage::BackendCreation, e))?,
        );
        let session_options = factory
            .build_session_options(&options)
            .map_err(|e| stage_error(MultimodalStage::SessionOptionsBuild, e))?;
        let session = backend
            .create_session(&session_options)
            .await
            .map_err(|e| stage_error(MultimodalStage::SessionCreation, e))?;
        self.session = Some(session);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Err(e) = session.close().await
        {
            warn!(error = %e, "failed to close multimodal session");
        }
        if let Some(backend) = self.backend.take()
            && let Err(e) = backend.close().await
        {
            warn!(error = %e, "failed to close multimodal backend");
        }
    }
}

/// Keeps out-of-memory distinct; everything else is tagged with its stage.
fn stage_error(stage: MultimodalStage, e: EdgeRagError) -> EdgeRagError {
    match e {
        EdgeRagError::OutOfMemory(_) | EdgeRagError::Multimodal { .. } => e,
        other => EdgeRagError::Multimodal {
            stage,
            message: other.to_string(),
        },
    }
}

/// Single owner of the language model backend.
pub struct InferenceManager {
    factory: Arc<dyn BackendFactory>,
    slot: Mutex<BackendSlot>,
    state: watch::Sender<BackendState>,
    rag_chain: RetrievalInferenceChain,
    translate_chain: RetrievalInferenceChain,
    settings: ManagerSettings,
    loaded: AtomicBool,
    completed: AtomicU64,
    fallbacks: AtomicU64,
}

impl InferenceManager {
    /// Creates a manager in the `Initializing` state. Call
    /// [`initialize`](Self::initialize) to load the backend eagerly; otherwise
    /// the first request loads it.
    pub fn new(
        factory: Arc<dyn BackendFactory>,
        memory: Arc<RwLock<SemanticMemory>>,
        settings: ManagerSettings,
    ) -> Self {
        let rag_chain = RetrievalInferenceChain::new(
            Arc::clone(&memory),
            settings.rag_template.clone(),
            settings.top_k,
            settings.min_score,
        );
        let translate_chain = RetrievalInferenceChain::passthrough(memory);
        let (state, _) = watch::channel(BackendState::Uninitialized);
        state.send_replace(BackendState::Initializing);

        Self {
            factory,
            slot: Mutex::new(BackendSlot::Empty),
            state,
            rag_chain,
            translate_chain,
            settings,
            loaded: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BackendState {
        self.state.borrow().clone()
    }

    /// Subscribes to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.state.subscribe()
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            state: self.state(),
            backend_loaded: self.loaded.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Loads the persistent backend unless it is already loaded or failed.
    pub async fn initialize(&self) -> Result<(), EdgeRagError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await.map(|_| ())
    }

    /// Drops any loaded or failed backend and loads a fresh one.
    pub async fn reinitialize(&self) -> Result<(), EdgeRagError> {
        let mut slot = self.slot.lock().await;
        self.unload(&mut slot).await;
        *slot = BackendSlot::Empty;
        self.ensure_loaded(&mut slot).await.map(|_| ())
    }

    /// Frees the persistent backend. The next request reloads it.
    ///
    /// Waits for an in-flight request to finish first.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        if self.unload(&mut slot).await {
            self.state.send_replace(BackendState::Uninitialized);
            info!("released inference backend");
        }
    }

    /// Answers `query` from retrieved context, streaming into `sink`.
    pub async fn generate(&self, query: &str, sink: &dyn StreamSink) -> String {
        self.generate_with_cancel(query, sink, &CancellationToken::new())
            .await
    }

    pub async fn generate_with_cancel(
        &self,
        query: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        let Some(mut slot) = self.acquire(cancel).await else {
            sink.emit("", true);
            return String::new();
        };
        let result = self
            .run_text(&mut slot, &self.rag_chain, query, sink, cancel)
            .await;
        self.answer(result, sink, |e| format!("Sorry, I couldn't generate a response: {e}"))
    }

    /// Answers `query` about `image`, falling back to text-only on any
    /// multimodal failure.
    pub async fn generate_with_image(
        &self,
        query: &str,
        image: &RawImage,
        sink: &dyn StreamSink,
    ) -> String {
        self.generate_with_image_cancel(query, image, sink, &CancellationToken::new())
            .await
    }

    pub async fn generate_with_image_cancel(
        &self,
        query: &str,
        image: &RawImage,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        let Some(mut slot) = self.acquire(cancel).await else {
            sink.emit("", true);
            return String::new();
        };
        let result = self
            .run_multimodal(&mut slot, query, image, sink, cancel)
            .await;
        self.answer(result, sink, |e| format!("Sorry, I couldn't generate a response: {e}"))
    }

    /// Dispatches on `mode`: text-only or with an attached image.
    pub async fn respond(
        &self,
        query: &str,
        mode: &GenerationMode,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        match mode {
            GenerationMode::TextOnly => self.generate_with_cancel(query, sink, cancel).await,
            GenerationMode::Multimodal(image) => {
                self.generate_with_image_cancel(query, image, sink, cancel)
                    .await
            }
        }
    }

    /// Translates `text` into `language` without retrieval.
    pub async fn translate(&self, text: &str, language: &str, sink: &dyn StreamSink) -> String {
        self.translate_with_cancel(text, language, sink, &CancellationToken::new())
            .await
    }

    pub async fn translate_with_cancel(
        &self,
        text: &str,
        language: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> String {
        let prompt = render_translation(&self.settings.translation_template, language, text);
        let Some(mut slot) = self.acquire(cancel).await else {
            sink.emit("", true);
            return String::new();
        };
        let result = self
            .run_text(&mut slot, &self.translate_chain, &prompt, sink, cancel)
            .await;
        self.answer(result, sink, |e| format!("Translation failed: {e}"))
    }

    /// Waits for the mutex unless the caller cancels first.
    async fn acquire(&self, cancel: &CancellationToken) -> Option<MutexGuard<'_, BackendSlot>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("request cancelled while queued");
                None
            }
            guard = self.slot.lock() => Some(guard),
        }
    }

    /// Successful completions have already sent `done`; a failure sends the
    /// message in its place.
    fn answer(
        &self,
        result: Result<Completion, EdgeRagError>,
        sink: &dyn StreamSink,
        describe: impl FnOnce(&EdgeRagError) -> String,
    ) -> String {
        match result {
            Ok(completion) => {
                if completion.cancelled {
                    debug!(partial_len = completion.text.len(), "generation cancelled");
                } else {
                    self.completed.fetch_add(1, Ordering::Relaxed);
                }
                completion.text
            }
            Err(e) => {
                error!(error = %e, "generation failed");
                let message = describe(&e);
                sink.emit(&message, true);
                message
            }
        }
    }

    /// Returns the loaded backend, loading it if the slot is empty.
    async fn ensure_loaded<'s>(
        &self,
        slot: &'s mut BackendSlot,
    ) -> Result<&'s dyn InferenceBackend, EdgeRagError> {
        if let BackendSlot::Failed(reason) = slot {
            return Err(EdgeRagError::Initialization {
                component: "language model".to_string(),
                message: reason.clone(),
            });
        }
        if matches!(slot, BackendSlot::Empty) {
            self.state.send_replace(BackendState::Initializing);
            self.load(slot).await?;
        }
        match slot {
            BackendSlot::Loaded(backend) => Ok(&**backend),
            _ => Err(EdgeRagError::BackendUnavailable),
        }
    }

    /// Loads into `slot`, publishing `Ready` or `Failed`.
    async fn load(&self, slot: &mut BackendSlot) -> Result<(), EdgeRagError> {
        match self.factory.load_text_backend().await {
            Ok(backend) => {
                info!(backend = backend.name(), "inference backend ready");
                *slot = BackendSlot::Loaded(backend);
                self.loaded.store(true, Ordering::Relaxed);
                self.state.send_replace(BackendState::Ready);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to load inference backend");
                let reason = e.to_string();
                *slot = BackendSlot::Failed(reason.clone());
                self.loaded.store(false, Ordering::Relaxed);
                self.state.send_replace(BackendState::Failed(reason.clone()));
                Err(EdgeRagError::Initialization {
                    component: "language model".to_string(),
                    message: reason,
                })
            }
        }
    }

    /// Shuts down a loaded backend and empties the slot. Returns true if
    /// something was loaded.
    async fn unload(&self, slot: &mut BackendSlot) -> bool {
        let BackendSlot::Loaded(backend) = std::mem::replace(slot, BackendSlot::Empty) else {
            return false;
        };
        if let Err(e) = backend.shutdown().await {
            warn!(error = %e, "inference backend shutdown reported an error");
        }
        self.loaded.store(false, Ordering::Relaxed);
        true
    }

    async fn run_text(
        &self,
        slot: &mut BackendSlot,
        chain: &RetrievalInferenceChain,
        query: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, EdgeRagError> {
        let backend = self.ensure_loaded(slot).await?;
        let _busy = BusyGuard::enter(&self.state);
        chain.invoke(&chain.request(query), backend, sink, cancel).await
    }

    async fn run_multimodal(
        &self,
        slot: &mut BackendSlot,
        query: &str,
        image: &RawImage,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, EdgeRagError> {
        if let BackendSlot::Failed(_) = slot {
            return self.run_text(slot, &self.rag_chain, query, sink, cancel).await;
        }
        if !self.settings.multimodal_enabled {
            debug!("multimodal disabled, answering from text only");
            return self.run_text(slot, &self.rag_chain, query, sink, cancel).await;
        }
        if image.is_empty() {
            return self
                .fall_back(slot, query, sink, cancel, &EdgeRagError::Multimodal {
                    stage: MultimodalStage::Input,
                    message: "image is empty".to_string(),
                })
                .await;
        }

        let request = self.rag_chain.request(query);
        let context = match self.rag_chain.retrieve_context(&request).await {
            Ok(context) => context,
            Err(e) => return self.fall_back(slot, query, sink, cancel, &e).await,
        };

        let outcome = {
            let _busy = BusyGuard::enter(&self.state);
            let released = self.unload(slot).await;

            let prompt = self.rag_chain.template().render(
                &context,
                &format!("{}{}", self.settings.image_preamble, query),
            );
            let mut transient = Transient::default();
            let outcome = self
                .attempt_multimodal(&mut transient, &prompt, image, cancel)
                .await;
            transient.close().await;

            // Restore before anyone else can take the mutex.
            if matches!(slot, BackendSlot::Empty) {
                debug!(released, "reloading persistent backend");
                if let Err(e) = self.load(slot).await {
                    warn!(error = %e, "persistent backend did not come back after image request");
                }
            }
            outcome
        };

        match outcome {
            Ok(completion) => {
                sink.emit(&completion.text, true);
                Ok(completion)
            }
            Err(e) => self.fall_back(slot, query, sink, cancel, &e).await,
        }
    }

    /// Text-only retry with the caller's original query.
    async fn fall_back(
        &self,
        slot: &mut BackendSlot,
        query: &str,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
        cause: &EdgeRagError,
    ) -> Result<Completion, EdgeRagError> {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        warn!(
            error = %cause,
            out_of_memory = cause.is_out_of_memory(),
            "multimodal path failed, falling back to text-only"
        );
        self.run_text(slot, &self.rag_chain, query, sink, cancel).await
    }

    /// Runs the image request to completion without forwarding anything, so
    /// a failure part way through leaves the caller's sink untouched for the
    /// text-only retry. The caller emits the final text.
    async fn attempt_multimodal(
        &self,
        transient: &mut Transient,
        prompt: &str,
        image: &RawImage,
        cancel: &CancellationToken,
    ) -> Result<Completion, EdgeRagError> {
        let limit = self.settings.construction_timeout;
        let built = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Ok(Completion { text: String::new(), cancelled: true });
            }
            built = tokio::time::timeout(limit, transient.construct(self.factory.as_ref())) => built,
        };
        match built {
            Ok(result) => result?,
            Err(_) => return Err(EdgeRagError::Timeout { duration: limit }),
        }

        let session = transient
            .session
            .as_mut()
            .ok_or_else(|| EdgeRagError::Internal("multimodal session missing".to_string()))?;
        session
            .add_image(image)
            .await
            .map_err(|e| stage_error(MultimodalStage::Input, e))?;
        session
            .add_query_chunk(prompt)
            .await
            .map_err(|e| stage_error(MultimodalStage::Input, e))?;
        let stream = session
            .generate()
            .await
            .map_err(|e| stage_error(MultimodalStage::Generation, e))?;

        debug!(image_bytes = image.bytes.len(), "streaming multimodal response");
        let mut held = ResponseAccumulator::new(&NullSink);
        let cancelled = match held.drain(stream, cancel).await {
            Ok(()) => false,
            Err(EdgeRagError::Cancelled) => true,
            Err(e) => return Err(stage_error(MultimodalStage::Generation, e)),
        };
        Ok(Completion {
            text: held.text().trim().to_string(),
            cancelled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_tags_generic_failures() {
        let err = stage_error(MultimodalStage::SessionCreation, EdgeRagError::backend("boom"));
        assert!(matches!(
            err,
            EdgeRagError::Multimodal {
                stage: MultimodalStage::SessionCreation,
                ..
            }
        ));
    }

    #[test]
    fn stage_error_keeps_out_of_memory() {
        let err = stage_error(
            MultimodalStage::BackendCreation,
            EdgeRagError::OutOfMemory("vision encoder".into()),
        );
        assert!(err.is_out_of_memory());
    }

    #[test]
    fn busy_guard_restores_ready() {
        let (tx, rx) = watch::channel(BackendState::Ready);
        {
            let _busy = BusyGuard::enter(&tx);
            assert_eq!(*rx.borrow(), BackendState::Busy);
        }
        assert_eq!(*rx.borrow(), BackendState::Ready);
    }

    #[test]
    fn busy_guard_does_not_mask_failure() {
        let (tx, rx) = watch::channel(BackendState::Ready);
        {
            let _busy = BusyGuard::enter(&tx);
            tx.send_replace(BackendState::Failed("reload failed".into()));
        }
        assert!(rx.borrow().is_failed());
    }

    #[test]
    fn settings_follow_config() {
        let config = EdgeRagConfig::default();
        let settings = ManagerSettings::from_config(&config).unwrap();
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.min_score, 0.0);
        assert!(settings.rag_template.uses_context());
        assert!(settings.multimodal_enabled);
    }
}
