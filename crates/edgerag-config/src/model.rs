// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the edgerag pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level edgerag configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeRagConfig {
    /// Application identity, logging, and data directory.
    #[serde(default)]
    pub app: AppConfig,

    /// Tokenizer and embedding model settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Semantic memory and retrieval settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persistent language model backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Transient multimodal backend settings.
    #[serde(default)]
    pub multimodal: MultimodalConfig,

    /// Prompt templates.
    #[serde(default)]
    pub prompt: PromptConfig,
}

/// Application-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Display name used in logs and the shell prompt.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding model files and the vector store snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_app_name() -> String {
    "edgerag".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("edgerag"))
        .unwrap_or_else(|| std::path::PathBuf::from(".edgerag"))
        .to_string_lossy()
        .to_string()
}

/// Tokenizer and embedding model configuration.
///
/// Defaults match a DistilBERT multilingual WordPiece vocabulary feeding a
/// 512-dimension sentence embedding model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Path to the ONNX embedding model. Relative paths resolve against `app.data_dir`.
    #[serde(default = "default_embedding_model_path")]
    pub model_path: String,

    /// Path to the vocabulary (`vocab.txt` WordPiece list or `tokenizer.json`).
    #[serde(default = "default_vocab_path")]
    pub vocab_path: String,

    /// Fixed token sequence length including the two boundary markers.
    #[serde(default = "default_max_sequence_length")]
    pub max_sequence_length: usize,

    /// Embedding dimension D.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Ids at or above this value are remapped to `unk_id`.
    #[serde(default = "default_vocab_size")]
    pub vocab_size: u32,

    #[serde(default = "default_unk_id")]
    pub unk_id: u32,

    #[serde(default = "default_cls_id")]
    pub cls_id: u32,

    #[serde(default = "default_sep_id")]
    pub sep_id: u32,

    #[serde(default)]
    pub pad_id: u32,

    /// Lowercase input before WordPiece (only used for `vocab.txt` vocabularies).
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,

    /// Feed an all-zero `token_type_ids` input (BERT exports); DistilBERT-style models omit it.
    #[serde(default)]
    pub token_type_ids: bool,

    /// Model output tensor holding the embedding. Probed at load time when unset.
    #[serde(default)]
    pub output_index: Option<usize>,

    /// ONNX Runtime intra-op thread count.
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_embedding_model_path(),
            vocab_path: default_vocab_path(),
            max_sequence_length: default_max_sequence_length(),
            dimensions: default_dimensions(),
            vocab_size: default_vocab_size(),
            unk_id: default_unk_id(),
            cls_id: default_cls_id(),
            sep_id: default_sep_id(),
            pad_id: 0,
            lowercase: default_lowercase(),
            token_type_ids: false,
            output_index: None,
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_embedding_model_path() -> String {
    "models/embedding/model_int8.onnx".to_string()
}

fn default_vocab_path() -> String {
    "models/embedding/vocab.txt".to_string()
}

fn default_max_sequence_length() -> usize {
    128
}

fn default_dimensions() -> usize {
    512
}

fn default_vocab_size() -> u32 {
    30522
}

fn default_unk_id() -> u32 {
    100
}

fn default_cls_id() -> u32 {
    101
}

fn default_sep_id() -> u32 {
    102
}

fn default_lowercase() -> bool {
    true
}

fn default_intra_threads() -> usize {
    4
}

/// Semantic memory configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Number of chunks injected as context for question answering.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity for a chunk to be used as context.
    #[serde(default)]
    pub score_threshold: f32,

    /// Lines starting with this marker begin a new chunk during ingestion.
    #[serde(default = "default_chunk_separator")]
    pub chunk_separator: String,

    /// Optional SQLite snapshot of the vector store, relative to `app.data_dir`.
    #[serde(default)]
    pub store_path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: 0.0,
            chunk_separator: default_chunk_separator(),
            store_path: None,
        }
    }
}

fn default_top_k() -> usize {
    3
}

fn default_chunk_separator() -> String {
    "<chunk_splitter>".to_string()
}

/// Persistent language model backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the local Ollama daemon.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model tag used for text generation.
    #[serde(default = "default_backend_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_backend_top_k")]
    pub top_k: u32,

    /// Overall HTTP timeout for a single generation request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_backend_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_backend_top_k(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_backend_model() -> String {
    "gemma3n:e4b".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    1.0
}

fn default_top_p() -> f32 {
    0.95
}

fn default_backend_top_k() -> u32 {
    64
}

fn default_request_timeout_secs() -> u64 {
    300
}

/// Multimodal (text + image) generation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MultimodalConfig {
    /// When false, image requests go straight to text-only generation.
    #[serde(default = "default_multimodal_enabled")]
    pub enabled: bool,

    /// Vision-capable model tag. Defaults to `backend.model`.
    #[serde(default)]
    pub model: Option<String>,

    /// Smaller than the text budget to save memory.
    #[serde(default = "default_multimodal_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_multimodal_top_k")]
    pub top_k: u32,

    #[serde(default = "default_max_images")]
    pub max_images: u32,

    /// Upper bound on building the transient backend and its session.
    #[serde(default = "default_construction_timeout_secs")]
    pub construction_timeout_secs: u64,
}

impl Default for MultimodalConfig {
    fn default() -> Self {
        Self {
            enabled: default_multimodal_enabled(),
            model: None,
            max_tokens: default_multimodal_max_tokens(),
            top_k: default_multimodal_top_k(),
            max_images: default_max_images(),
            construction_timeout_secs: default_construction_timeout_secs(),
        }
    }
}

fn default_multimodal_enabled() -> bool {
    true
}

fn default_multimodal_max_tokens() -> u32 {
    512
}

fn default_multimodal_top_k() -> u32 {
    32
}

fn default_max_images() -> u32 {
    1
}

fn default_construction_timeout_secs() -> u64 {
    30
}

/// Prompt templates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PromptConfig {
    /// RAG template with `{context}` and `{query}` slots.
    #[serde(default = "default_rag_template")]
    pub rag_template: String,

    /// Translation instruction with `{language}` and `{text}` slots.
    #[serde(default = "default_translation_template")]
    pub translation_template: String,

    /// Prepended to the user's question on the multimodal path.
    #[serde(default = "default_image_preamble")]
    pub image_preamble: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            rag_template: default_rag_template(),
            translation_template: default_translation_template(),
            image_preamble: default_image_preamble(),
        }
    }
}

fn default_rag_template() -> String {
    "You are an assistant for question-answering tasks. Here are the things I want to \
     remember: {context} Use the things I want to remember, answer the following question \
     the user has: {query}"
        .to_string()
}

fn default_translation_template() -> String {
    "Translate the following text to {language}. Provide only the translation without any \
     additional explanation or commentary.\n\nText to translate: \"{text}\"\n\nTranslation:"
        .to_string()
}

fn default_image_preamble() -> String {
    "Please analyze the image I've provided and answer this question: ".to_string()
}

impl EdgeRagConfig {
    /// Resolves a possibly relative path against `app.data_dir`.
    pub fn resolve_path(&self, path: &str) -> std::path::PathBuf {
        let p = std::path::Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::path::Path::new(&self.app.data_dir).join(p)
        }
    }

    /// The model used for the multimodal path.
    pub fn multimodal_model(&self) -> &str {
        self.multimodal
            .model
            .as_deref()
            .unwrap_or(self.backend.model.as_str())
    }
}
