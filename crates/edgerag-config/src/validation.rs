// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: template slots, token id ranges,
//! and numeric bounds. All failures are collected before returning.

use crate::diagnostic::ConfigError;
use crate::model::EdgeRagConfig;

/// Largest accepted `memory.top_k`.
const MAX_TOP_K: usize = 100;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Returns every error found rather than stopping at the first.
pub fn validate_config(config: &EdgeRagConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.app.log_level.to_lowercase().as_str()) {
        errors.push(ConfigError::invalid(
            "app.log_level",
            format!(
                "`{}` is not one of {}",
                config.app.log_level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }

    validate_embedding(config, &mut errors);
    validate_memory(config, &mut errors);
    validate_generation(config, &mut errors);
    validate_prompts(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_embedding(config: &EdgeRagConfig, errors: &mut Vec<ConfigError>) {
    let e = &config.embedding;

    if e.dimensions == 0 {
        errors.push(ConfigError::invalid(
            "embedding.dimensions",
            "must be greater than zero",
        ));
    }

    // Room for [CLS] and [SEP].
    if e.max_sequence_length < 2 {
        errors.push(ConfigError::invalid(
            "embedding.max_sequence_length",
            format!("must be at least 2, got {}", e.max_sequence_length),
        ));
    }

    for (key, id) in [
        ("embedding.unk_id", e.unk_id),
        ("embedding.cls_id", e.cls_id),
        ("embedding.sep_id", e.sep_id),
        ("embedding.pad_id", e.pad_id),
    ] {
        if id >= e.vocab_size {
            errors.push(ConfigError::invalid(
                key,
                format!("{id} is outside the vocabulary (size {})", e.vocab_size),
            ));
        }
    }

    if e.model_path.trim().is_empty() {
        errors.push(ConfigError::invalid("embedding.model_path", "must not be empty"));
    }
    if e.vocab_path.trim().is_empty() {
        errors.push(ConfigError::invalid("embedding.vocab_path", "must not be empty"));
    }
}

fn validate_memory(config: &EdgeRagConfig, errors: &mut Vec<ConfigError>) {
    let m = &config.memory;

    if m.top_k > MAX_TOP_K {
        errors.push(ConfigError::invalid(
            "memory.top_k",
            format!("must be at most {MAX_TOP_K}, got {}", m.top_k),
        ));
    }

    if !m.score_threshold.is_finite() {
        errors.push(ConfigError::invalid(
            "memory.score_threshold",
            "must be a finite number",
        ));
    }

    if m.chunk_separator.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "memory.chunk_separator",
            "must not be empty",
        ));
    }
}

fn validate_generation(config: &EdgeRagConfig, errors: &mut Vec<ConfigError>) {
    let b = &config.backend;

    if b.max_tokens == 0 {
        errors.push(ConfigError::invalid("backend.max_tokens", "must be greater than zero"));
    }
    if !(b.temperature.is_finite() && b.temperature >= 0.0) {
        errors.push(ConfigError::invalid(
            "backend.temperature",
            format!("must be a non-negative number, got {}", b.temperature),
        ));
    }
    if !(b.top_p > 0.0 && b.top_p <= 1.0) {
        errors.push(ConfigError::invalid(
            "backend.top_p",
            format!("must be in (0, 1], got {}", b.top_p),
        ));
    }
    if !(b.base_url.starts_with("http://") || b.base_url.starts_with("https://")) {
        errors.push(ConfigError::invalid(
            "backend.base_url",
            format!("`{}` is not an http(s) URL", b.base_url),
        ));
    }

    let mm = &config.multimodal;
    if mm.max_tokens == 0 {
        errors.push(ConfigError::invalid(
            "multimodal.max_tokens",
            "must be greater than zero",
        ));
    }
    if mm.max_images == 0 {
        errors.push(ConfigError::invalid(
            "multimodal.max_images",
            "must be at least 1",
        ));
    }
    if mm.construction_timeout_secs == 0 {
        errors.push(ConfigError::invalid(
            "multimodal.construction_timeout_secs",
            "must be greater than zero",
        ));
    }
}

fn validate_prompts(config: &EdgeRagConfig, errors: &mut Vec<ConfigError>) {
    let p = &config.prompt;

    for slot in ["{context}", "{query}"] {
        if !p.rag_template.contains(slot) {
            errors.push(ConfigError::invalid(
                "prompt.rag_template",
                format!("missing the {slot} slot"),
            ));
        }
    }
    for slot in ["{language}", "{text}"] {
        if !p.translation_template.contains(slot) {
            errors.push(ConfigError::invalid(
                "prompt.translation_template",
                format!("missing the {slot} slot"),
            ));
        }
    }
}
