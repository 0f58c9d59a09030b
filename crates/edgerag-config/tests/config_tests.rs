// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the edgerag configuration system.

use edgerag_config::diagnostic::ConfigError;
use edgerag_config::model::EdgeRagConfig;
use edgerag_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[app]
name = "field-notes"
log_level = "debug"
data_dir = "/data/edgerag"

[embedding]
model_path = "/models/use.onnx"
vocab_path = "/models/vocab.txt"
max_sequence_length = 64
dimensions = 384
output_index = 1

[memory]
top_k = 5
score_threshold = 0.25
store_path = "memory.sqlite"

[backend]
base_url = "http://10.0.0.2:11434"
model = "gemma3n:e2b"
temperature = 0.7

[multimodal]
enabled = false
model = "llava:7b"
construction_timeout_secs = 10

[prompt]
image_preamble = "Look at the picture: "
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.name, "field-notes");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.embedding.dimensions, 384);
    assert_eq!(config.embedding.max_sequence_length, 64);
    assert_eq!(config.embedding.output_index, Some(1));
    assert_eq!(config.memory.top_k, 5);
    assert_eq!(config.memory.score_threshold, 0.25);
    assert_eq!(config.memory.store_path.as_deref(), Some("memory.sqlite"));
    assert_eq!(config.backend.model, "gemma3n:e2b");
    assert_eq!(config.backend.temperature, 0.7);
    assert!(!config.multimodal.enabled);
    assert_eq!(config.multimodal_model(), "llava:7b");
    assert_eq!(config.multimodal.construction_timeout_secs, 10);
    assert_eq!(config.prompt.image_preamble, "Look at the picture: ");
    // Untouched fields keep their defaults.
    assert_eq!(config.embedding.cls_id, 101);
    assert_eq!(config.backend.top_k, 64);
}

/// Unknown field in [embedding] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_field_in_embedding_suggests_correction() {
    let toml = r#"
[embedding]
dimentions = 384
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown key should fail");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion, .. }
                if key == "dimentions" && suggestion.as_deref() == Some("dimensions")
        )
    });
    assert!(found, "expected UnknownKey for dimentions, got: {errors:?}");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = r#"
[telemetry]
enabled = true
"#;

    let errors = load_and_validate_str(toml).expect_err("unknown section should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telemetry"))
    );
}

/// Missing sections fall back to defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = load_and_validate_str("").expect("empty config should validate");
    assert_eq!(config.app.name, "edgerag");
    assert_eq!(config.embedding.max_sequence_length, 128);
    assert_eq!(config.embedding.dimensions, 512);
    assert_eq!(config.embedding.vocab_size, 30522);
    assert_eq!(config.embedding.unk_id, 100);
    assert_eq!(config.embedding.sep_id, 102);
    assert_eq!(config.embedding.pad_id, 0);
    assert_eq!(config.memory.top_k, 3);
    assert_eq!(config.memory.score_threshold, 0.0);
    assert_eq!(config.memory.chunk_separator, "<chunk_splitter>");
    assert_eq!(config.backend.max_tokens, 1024);
    assert_eq!(config.backend.top_p, 0.95);
    assert_eq!(config.multimodal.max_tokens, 512);
    assert_eq!(config.multimodal.top_k, 32);
    assert_eq!(config.multimodal.max_images, 1);
}

/// Dotted keys, as produced by the env provider, override TOML values.
#[test]
fn dotted_override_wins_over_toml() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let toml_content = r#"
[memory]
top_k = 4
"#;

    let config: EdgeRagConfig = Figment::new()
        .merge(Serialized::defaults(EdgeRagConfig::default()))
        .merge(Toml::string(toml_content))
        .merge(("memory.top_k", 7))
        .merge(("embedding.max_sequence_length", 256))
        .extract()
        .expect("should merge override");

    assert_eq!(config.memory.top_k, 7);
    assert_eq!(config.embedding.max_sequence_length, 256);
}

#[test]
fn missing_config_file_is_silently_skipped() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: EdgeRagConfig = Figment::new()
        .merge(Serialized::defaults(EdgeRagConfig::default()))
        .merge(Toml::file("/nonexistent/path/edgerag.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.app.name, "edgerag");
}

#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[memory]
top_k = "three"
"#;

    let errors = load_and_validate_str(toml).expect_err("wrong type should fail");
    let err_str = errors[0].to_string();
    assert!(
        err_str.contains("invalid type") || err_str.contains("top_k"),
        "error should mention type mismatch, got: {err_str}"
    );
}

#[test]
fn validation_errors_are_collected() {
    let toml = r#"
[embedding]
dimensions = 0

[memory]
top_k = 1000

[prompt]
rag_template = "no slots here"
"#;

    let errors = load_and_validate_str(toml).expect_err("invalid values should fail");
    let keys: Vec<&str> = errors
        .iter()
        .filter_map(|e| match e {
            ConfigError::Validation { key, .. } => Some(key.as_str()),
            _ => None,
        })
        .collect();
    assert!(keys.contains(&"embedding.dimensions"));
    assert!(keys.contains(&"memory.top_k"));
    assert!(keys.contains(&"prompt.rag_template"));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "top_kk".to_string(),
        suggestion: Some("top_k".to_string()),
        valid_keys: "top_k, score_threshold".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help").to_string();
    assert!(help.contains("did you mean `top_k`"), "got: {help}");

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("top_kk"));
}

#[test]
fn explicit_path_is_loaded_and_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edgerag.toml");
    std::fs::write(&path, "[memory]\ntop_k = 2\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should validate");
    assert_eq!(config.memory.top_k, 2);
}

#[test]
fn explicit_path_unknown_key_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edgerag.toml");
    std::fs::write(&path, "[backend]\nmodle = \"gemma\"\n").unwrap();

    let errors = load_and_validate_path(&path).expect_err("unknown key should fail");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion, .. }
                if key == "modle" && suggestion.as_deref() == Some("model")
        )
    });
    assert!(found, "got: {errors:?}");
}
