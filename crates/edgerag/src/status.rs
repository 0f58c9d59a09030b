// SPDX-FileCopyrightText: 2026 edgerag Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `edgerag status` command implementation.
//!
//! Reports whether the embedding model files are in place, how many chunks
//! the store snapshot holds, and whether the Ollama daemon is reachable with
//! the configured models installed. Nothing is loaded into memory.

use std::io::IsTerminal;
use std::time::Duration;

use edgerag_config::EdgeRagConfig;
use edgerag_core::EdgeRagError;
use edgerag_memory::{ModelManager, VectorStore};
use edgerag_ollama::client::OllamaClient;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub embedding_model: String,
    pub missing_files: Vec<String>,
    pub store_path: Option<String>,
    pub stored_chunks: Option<usize>,
    pub backend_url: String,
    pub backend_reachable: bool,
    pub text_model: ModelPresence,
    pub vision_model: ModelPresence,
}

#[derive(Debug, Serialize)]
pub struct ModelPresence {
    pub name: String,
    pub installed: bool,
}

/// Run the `edgerag status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &EdgeRagConfig, json: bool, plain: bool) -> Result<(), EdgeRagError> {
    let report = collect(config).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

async fn collect(config: &EdgeRagConfig) -> Result<StatusReport, EdgeRagError> {
    let files = ModelManager::from_config(config);
    let missing_files = files
        .missing()
        .iter()
        .map(|p| p.display().to_string())
        .collect();

    let stored_chunks = match files.store_path() {
        Some(path) if path.exists() => Some(
            VectorStore::load(path, config.embedding.dimensions)
                .await?
                .len(),
        ),
        Some(_) => Some(0),
        None => None,
    };

    let client = OllamaClient::new(&config.backend.base_url, Duration::from_secs(3))?;
    let installed = client.list_models().await;
    let backend_reachable = installed.is_ok();
    let installed = installed.unwrap_or_default();
    let presence = |name: &str| ModelPresence {
        name: name.to_string(),
        installed: installed.iter().any(|m| m == name),
    };

    Ok(StatusReport {
        embedding_model: files.model_path().display().to_string(),
        missing_files,
        store_path: files.store_path().map(|p| p.display().to_string()),
        stored_chunks,
        backend_url: config.backend.base_url.clone(),
        backend_reachable,
        text_model: presence(&config.backend.model),
        vision_model: presence(config.multimodal_model()),
    })
}

fn mark(ok: bool, use_color: bool) -> String {
    if use_color {
        use colored::Colorize;
        if ok { "✓".green().to_string() } else { "✗".red().to_string() }
    } else if ok {
        "[OK]".to_string()
    } else {
        "[FAIL]".to_string()
    }
}

fn print_report(report: &StatusReport, use_color: bool) {
    println!();
    println!("  edgerag status");
    println!("  {}", "-".repeat(35));

    println!(
        "    Embedding: {} {}",
        mark(report.missing_files.is_empty(), use_color),
        report.embedding_model
    );
    for missing in &report.missing_files {
        println!("               missing {missing}");
    }

    match (&report.store_path, report.stored_chunks) {
        (Some(path), Some(n)) => println!("    Memory:    {n} chunk(s) in {path}"),
        _ => println!("    Memory:    in-memory only (memory.store_path unset)"),
    }

    println!(
        "    Backend:   {} {}",
        mark(report.backend_reachable, use_color),
        report.backend_url
    );
    if report.backend_reachable {
        for model in [&report.text_model, &report.vision_model] {
            println!("               {} {}", mark(model.installed, use_color), model.name);
        }
    }

    let pull: Vec<&str> = [&report.text_model, &report.vision_model]
        .into_iter()
        .filter(|m| report.backend_reachable && !m.installed)
        .map(|m| m.name.as_str())
        .collect();
    if !pull.is_empty() {
        println!();
        for name in pull {
            println!("  Install with: ollama pull {name}");
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(reachable: bool) -> StatusReport {
        StatusReport {
            embedding_model: "/data/model.onnx".to_string(),
            missing_files: vec![],
            store_path: None,
            stored_chunks: None,
            backend_url: "http://127.0.0.1:11434".to_string(),
            backend_reachable: reachable,
            text_model: ModelPresence {
                name: "gemma3n:e4b".to_string(),
                installed: reachable,
            },
            vision_model: ModelPresence {
                name: "gemma3n:e4b".to_string(),
                installed: reachable,
            },
        }
    }

    #[test]
    fn plain_marks() {
        assert_eq!(mark(true, false), "[OK]");
        assert_eq!(mark(false, false), "[FAIL]");
    }

    #[test]
    fn status_report_serializes() {
        let json = serde_json::to_string(&report(true)).unwrap();
        assert!(json.contains("\"backend_reachable\":true"));
        assert!(json.contains("\"stored_chunks\":null"));
    }

    #[tokio::test]
    async fn unreachable_backend_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EdgeRagConfig::default();
        config.app.data_dir = dir.path().display().to_string();
        // Nothing listens on the discard port.
        config.backend.base_url = "http://127.0.0.1:9".to_string();

        let report = collect(&config).await.unwrap();
        assert!(!report.backend_reachable);
        assert_eq!(report.missing_files.len(), 2);
        assert!(!report.text_model.installed);
    }
}
