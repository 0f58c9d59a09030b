// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieval-augmented generation chain.
//!
//! One invocation retrieves the nearest chunks for the query, renders them
//! into the prompt template, and streams the backend's answer through a
//! [`ResponseAccumulator`].

use std::sync::Arc;

use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::InferenceBackend;
use edgerag_core::types::TaskType;
use edgerag_memory::{RetrievalRequest, SemanticMemory};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::accumulator::{Completion, ResponseAccumulator, StreamSink};
use crate::prompt::PromptTemplate;

/// Retriever, template, and retrieval parameters bound together.
#[derive(Clone)]
pub struct RetrievalInferenceChain {
    memory: Arc<RwLock<SemanticMemory>>,
    template: PromptTemplate,
    top_k: usize,
    min_score: f32,
    task: TaskType,
}

impl RetrievalInferenceChain {
    pub fn new(
        memory: Arc<RwLock<SemanticMemory>>,
        template: PromptTemplate,
        top_k: usize,
        min_score: f32,
    ) -> Self {
        Self {
            memory,
            template,
            top_k,
            min_score,
            task: TaskType::QuestionAnswering,
        }
    }

    /// A chain that retrieves nothing and sends the query as-is.
    pub fn passthrough(memory: Arc<RwLock<SemanticMemory>>) -> Self {
        Self {
            memory,
            template: PromptTemplate::passthrough(),
            top_k: 0,
            min_score: 0.0,
            task: TaskType::Translation,
        }
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Builds the retrieval request this chain issues for `query`.
    pub fn request(&self, query: &str) -> RetrievalRequest {
        RetrievalRequest::new(query, self.top_k, self.min_score).with_task(self.task)
    }

    /// Retrieved chunk texts in rank order, one per line.
    pub async fn retrieve_context(&self, request: &RetrievalRequest) -> Result<String, EdgeRagError> {
        if request.top_k == 0 {
            return Ok(String::new());
        }
        let result = self.memory.read().await.retrieve(request).await?;
        Ok(result.texts().collect::<Vec<_>>().join("\n"))
    }

    /// Retrieves context and renders the full prompt.
    pub async fn build_prompt(&self, request: &RetrievalRequest) -> Result<String, EdgeRagError> {
        let context = self.retrieve_context(request).await?;
        Ok(self.template.render(&context, &request.query))
    }

    /// Runs one request against `backend`, streaming into `sink`.
    pub async fn invoke(
        &self,
        request: &RetrievalRequest,
        backend: &dyn InferenceBackend,
        sink: &dyn StreamSink,
        cancel: &CancellationToken,
    ) -> Result<Completion, EdgeRagError> {
        let prompt = self.build_prompt(request).await?;
        debug!(
            task = %request.task,
            prompt_len = prompt.len(),
            backend = backend.name(),
            "invoking chain"
        );

        let stream = backend.generate(&prompt).await?;
        ResponseAccumulator::new(sink).complete(stream, cancel).await
    }
}
