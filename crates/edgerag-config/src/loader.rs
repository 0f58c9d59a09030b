// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./edgerag.toml` > `~/.config/edgerag/edgerag.toml` > `/etc/edgerag/edgerag.toml`
//! with environment variable overrides via `EDGERAG_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EdgeRagConfig;

/// Config sections that environment variables may address.
const SECTIONS: &[&str] = &["app", "embedding", "memory", "backend", "multimodal", "prompt"];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/edgerag/edgerag.toml` (system-wide)
/// 3. `~/.config/edgerag/edgerag.toml` (user XDG config)
/// 4. `./edgerag.toml` (local directory)
/// 5. `EDGERAG_*` environment variables
pub fn load_config() -> Result<EdgeRagConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<EdgeRagConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EdgeRagConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EdgeRagConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EdgeRagConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(EdgeRagConfig::default()))
        .merge(Toml::file("/etc/edgerag/edgerag.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("edgerag/edgerag.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("edgerag.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `EDGERAG_EMBEDDING_MAX_SEQUENCE_LENGTH` maps to
/// `embedding.max_sequence_length`.
fn env_provider() -> Env {
    Env::prefixed("EDGERAG_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section)
            && let Some(field) = rest.strip_prefix('_')
        {
            return format!("{section}.{field}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("app_log_level"), "app.log_level");
        assert_eq!(
            map_env_key("embedding_max_sequence_length"),
            "embedding.max_sequence_length"
        );
        assert_eq!(
            map_env_key("multimodal_construction_timeout_secs"),
            "multimodal.construction_timeout_secs"
        );
        assert_eq!(map_env_key("memory_top_k"), "memory.top_k");
    }

    #[test]
    fn unknown_section_is_left_alone() {
        assert_eq!(map_env_key("telemetry_enabled"), "telemetry_enabled");
    }
}
