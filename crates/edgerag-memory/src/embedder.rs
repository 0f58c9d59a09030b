// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX sentence embedding adapter for on-device inference.
//!
//! The output tensor carrying the embedding is chosen once at load time by a
//! probe inference, never per call. Inference runs on the blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use tracing::{debug, info, warn};

use edgerag_config::model::EmbeddingConfig;
use edgerag_core::error::EdgeRagError;
use edgerag_core::traits::EmbeddingAdapter;
use edgerag_core::traits::adapter::PluginAdapter;
use edgerag_core::types::{AdapterType, HealthStatus};

use crate::tokenizer::{TextTokenizer, TokenSequence};
use crate::types::l2_normalize;

/// Which model output holds the embedding and how to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSelection {
    /// Output of shape `[1, H]`, `H >= D`.
    Pooled { index: usize, hidden: usize },
    /// Output of shape `[1, S, H]`, `H >= D`; position 0 is used.
    FirstToken { index: usize, hidden: usize },
}

impl OutputSelection {
    pub fn index(&self) -> usize {
        match *self {
            OutputSelection::Pooled { index, .. } | OutputSelection::FirstToken { index, .. } => {
                index
            }
        }
    }

    /// Reads the first `dims` values of position 0. Both layouts store
    /// position 0 in the leading `hidden` floats.
    fn read(&self, data: &[f32], dims: usize) -> Option<Vec<f32>> {
        data.get(..dims).map(<[f32]>::to_vec)
    }
}

/// Classifies one output shape. `None` when it cannot carry a `dims` embedding.
fn classify(index: usize, shape: &[i64], dims: usize) -> Option<OutputSelection> {
    let hidden = usize::try_from(*shape.last()?).ok()?;
    if hidden < dims || shape.first() != Some(&1) {
        return None;
    }
    match shape.len() {
        2 => Some(OutputSelection::Pooled { index, hidden }),
        3 => Some(OutputSelection::FirstToken { index, hidden }),
        _ => None,
    }
}

/// Picks the embedding output from probed shapes.
///
/// An explicitly configured index must be usable. Otherwise the first pooled
/// output wins, then the first per-token output.
pub fn resolve_output(
    shapes: &[Option<Vec<i64>>],
    configured: Option<usize>,
    dims: usize,
) -> Result<OutputSelection, EdgeRagError> {
    let usable = |i: usize| {
        shapes
            .get(i)
            .and_then(Option::as_ref)
            .and_then(|shape| classify(i, shape, dims))
    };

    let selection = match configured {
        Some(i) => usable(i),
        None => {
            let candidates: Vec<OutputSelection> = (0..shapes.len()).filter_map(usable).collect();
            candidates
                .iter()
                .find(|s| matches!(s, OutputSelection::Pooled { .. }))
                .or_else(|| candidates.first())
                .copied()
        }
    };

    selection.ok_or_else(|| EdgeRagError::Initialization {
        component: "embedding model".to_string(),
        message: match configured {
            Some(i) => format!("output {i} cannot hold a {dims}-dimension embedding: {shapes:?}"),
            None => format!("no output can hold a {dims}-dimension embedding: {shapes:?}"),
        },
    })
}

struct EmbedderInner {
    /// ONNX Runtime session (not Sync, wrapped in Mutex).
    session: Mutex<Session>,
    tokenizer: TextTokenizer,
    selection: OutputSelection,
    dims: usize,
    token_type_ids: bool,
}

// Safety: Session is only reached through the Mutex. The tokenizer is
// read-only after construction.
unsafe impl Send for EmbedderInner {}
unsafe impl Sync for EmbedderInner {}

/// ONNX-based [`EmbeddingAdapter`].
///
/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct OnnxEmbedder {
    inner: Arc<EmbedderInner>,
}

impl OnnxEmbedder {
    /// Loads the tokenizer and model named by `config`.
    pub fn load(
        model_path: &Path,
        vocab_path: &Path,
        config: &EmbeddingConfig,
    ) -> Result<Self, EdgeRagError> {
        let tokenizer = TextTokenizer::from_file(vocab_path, config)?;
        Self::new(model_path, tokenizer, config)
    }

    /// Creates the session, probes its outputs, and fixes the output selection.
    pub fn new(
        model_path: &Path,
        tokenizer: TextTokenizer,
        config: &EmbeddingConfig,
    ) -> Result<Self, EdgeRagError> {
        let init_err = |message: String| EdgeRagError::Initialization {
            component: "embedding model".to_string(),
            message,
        };

        if !model_path.exists() {
            return Err(init_err(format!(
                "model not found at {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| init_err(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| init_err(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(config.intra_threads.max(1))
            .map_err(|e| init_err(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                init_err(format!(
                    "failed to load {}: {e}",
                    model_path.display()
                ))
            })?;
        let session = Mutex::new(session);

        let probe = tokenizer.tokenize("");
        let shapes: Vec<Option<Vec<i64>>> =
            run_model(&session, &probe, config.token_type_ids, None)
                .map_err(|e| init_err(format!("probe inference failed: {e}")))?
                .into_iter()
                .map(|out| out.map(|(shape, _)| shape))
                .collect();
        let selection = resolve_output(&shapes, config.output_index, config.dimensions)?;

        info!(
            model = %model_path.display(),
            dims = config.dimensions,
            ?selection,
            "embedding model loaded"
        );

        Ok(Self {
            inner: Arc::new(EmbedderInner {
                session,
                tokenizer,
                selection,
                dims: config.dimensions,
                token_type_ids: config.token_type_ids,
            }),
        })
    }

    pub fn selection(&self) -> OutputSelection {
        self.inner.selection
    }

    /// Embeds `text` on the calling thread.
    ///
    /// Always returns `D` components. Inference failures yield the zero
    /// vector, which scores 0.0 against everything.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        self.inner.embed_text(text)
    }
}

impl EmbedderInner {
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let seq = self.tokenizer.tokenize(text);
        let index = self.selection.index();
        let raw = run_model(&self.session, &seq, self.token_type_ids, Some(index))
            .ok()
            .and_then(|mut outs| outs.pop().flatten())
            .and_then(|(_, data)| self.selection.read(&data, self.dims));

        match raw {
            Some(v) => l2_normalize(&v),
            None => {
                warn!(chars = text.len(), "embedding inference failed, using zero vector");
                vec![0.0; self.dims]
            }
        }
    }
}

/// Runs the model once and copies out the requested outputs.
///
/// With `only = None` every output is returned; outputs that are not f32
/// tensors come back as `None`.
fn run_model(
    session: &Mutex<Session>,
    seq: &TokenSequence,
    token_type_ids: bool,
    only: Option<usize>,
) -> Result<Vec<Option<(Vec<i64>, Vec<f32>)>>, EdgeRagError> {
    let len = seq.ids.len();
    let shape_err = |e: ndarray::ShapeError| EdgeRagError::Embedding(format!("bad input shape: {e}"));
    let ids = Array2::from_shape_vec((1, len), seq.ids.clone()).map_err(shape_err)?;
    let mask = Array2::from_shape_vec((1, len), seq.attention_mask.clone()).map_err(shape_err)?;
    let types = Array2::<i64>::zeros((1, len));

    let tensor_err = |e: ort::Error| EdgeRagError::Embedding(format!("failed to build input: {e}"));
    let ids_tensor = TensorRef::from_array_view(&ids).map_err(tensor_err)?;
    let mask_tensor = TensorRef::from_array_view(&mask).map_err(tensor_err)?;

    let mut session = session
        .lock()
        .map_err(|e| EdgeRagError::Embedding(format!("session lock poisoned: {e}")))?;

    let outputs = if token_type_ids {
        let types_tensor = TensorRef::from_array_view(&types).map_err(tensor_err)?;
        session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor,
            "token_type_ids" => types_tensor
        ])
    } else {
        session.run(ort::inputs![
            "input_ids" => ids_tensor,
            "attention_mask" => mask_tensor
        ])
    }
    .map_err(|e| EdgeRagError::Embedding(format!("inference failed: {e}")))?;

    let count = outputs.len();
    let indices: Vec<usize> = match only {
        Some(i) if i < count => vec![i],
        Some(i) => {
            return Err(EdgeRagError::Embedding(format!(
                "model has {count} outputs, wanted index {i}"
            )));
        }
        None => (0..count).collect(),
    };

    let extracted = indices
        .into_iter()
        .map(|i| match outputs[i].try_extract_tensor::<f32>() {
            Ok((shape, data)) => Some((shape.iter().copied().collect(), data.to_vec())),
            Err(e) => {
                debug!(index = i, error = %e, "output is not an f32 tensor");
                None
            }
        })
        .collect();
    Ok(extracted)
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, EdgeRagError> {
        match self.inner.session.lock() {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(format!("session lock poisoned: {e}"))),
        }
    }

    async fn shutdown(&self) -> Result<(), EdgeRagError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    fn dimensions(&self) -> usize {
        self.inner.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EdgeRagError> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.embed_text(&text))
            .await
            .map_err(|e| EdgeRagError::Embedding(format!("embedding task failed: {e}")))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EdgeRagError> {
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || texts.iter().map(|t| inner.embed_text(t)).collect())
            .await
            .map_err(|e| EdgeRagError::Embedding(format!("embedding task failed: {e}")))
    }
}
